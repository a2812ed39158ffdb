//! In-memory collaborators for tests and single-node deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use parley_core::{
    ConversationRef, IdentityId, Message, Panel, PanelId, Principal, Session, SessionId,
    SessionKind, WorkspaceId,
};
use serde::Deserialize;
use tracing::debug;

use crate::collaborators::{
    AuthenticationProvider, ConversationDirectory, HistoryPage, HistoryQuery, MessageStore,
};
use crate::errors::{RealtimeError, Result};

// ── Directory ───────────────────────────────────────────────────────────────

/// Sessions and panels held in concurrent maps.
#[derive(Default)]
pub struct InMemoryDirectory {
    sessions: DashMap<SessionId, Session>,
    panels: DashMap<PanelId, Panel>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session.
    pub fn insert_session(&self, session: Session) {
        let _ = self.sessions.insert(session.id.clone(), session);
    }

    /// Insert or replace a panel.
    pub fn insert_panel(&self, panel: Panel) {
        let _ = self.panels.insert(panel.id.clone(), panel);
    }

    /// Add a participant to a group session.
    pub fn add_session_participant(&self, id: &SessionId, identity: IdentityId) -> Result<bool> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RealtimeError::NotFound(ConversationRef::Session(id.clone())))?;
        Ok(session.add_participant(identity)?)
    }

    /// Remove a participant from a group session.
    pub fn remove_session_participant(&self, id: &SessionId, identity: &IdentityId) -> Result<bool> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RealtimeError::NotFound(ConversationRef::Session(id.clone())))?;
        Ok(session.remove_participant(identity)?)
    }

    /// Number of sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of panels.
    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }
}

#[async_trait]
impl ConversationDirectory for InMemoryDirectory {
    async fn session_by_id(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|s| s.clone())
    }

    async fn panel_by_id(&self, id: &PanelId) -> Option<Panel> {
        self.panels.get(id).map(|p| p.clone())
    }

    async fn sessions_for_identity(&self, identity: &IdentityId) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.is_participant(identity))
            .map(|s| s.id.clone())
            .collect();
        ids.sort();
        ids
    }

    async fn panels_for_workspace(&self, workspace: &WorkspaceId) -> Vec<Panel> {
        let mut panels: Vec<Panel> = self
            .panels
            .iter()
            .filter(|p| &p.workspace_id == workspace)
            .map(|p| p.clone())
            .collect();
        panels.sort_by(|a, b| a.id.cmp(&b.id));
        panels
    }

    async fn add_panel_participant(&self, panel: &PanelId, identity: &IdentityId) -> bool {
        self.panels
            .get_mut(panel)
            .is_some_and(|mut p| p.add_participant(identity.clone()))
    }
}

// ── Authentication ──────────────────────────────────────────────────────────

/// Bearer-token lookup table.
#[derive(Default)]
pub struct StaticTokenAuthenticator {
    tokens: DashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `principal`.
    pub fn insert(&self, token: impl Into<String>, principal: Principal) {
        let _ = self.tokens.insert(token.into(), principal);
    }

    /// Stop accepting `token`.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

#[async_trait]
impl AuthenticationProvider for StaticTokenAuthenticator {
    async fn verify(&self, credential: &str) -> Result<Principal> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(RealtimeError::AuthenticationFailure("missing credential".into()));
        }
        self.tokens
            .get(credential)
            .map(|p| p.clone())
            .ok_or_else(|| RealtimeError::AuthenticationFailure("unknown token".into()))
    }
}

// ── Message store ───────────────────────────────────────────────────────────

/// Append-only per-conversation logs.
#[derive(Default)]
pub struct InMemoryMessageStore {
    logs: DashMap<ConversationRef, Vec<Message>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages stored for `conversation`.
    pub fn len(&self, conversation: &ConversationRef) -> usize {
        self.logs.get(conversation).map_or(0, |log| log.len())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: &Message) -> Result<()> {
        self.logs
            .entry(message.conversation.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn history(
        &self,
        conversation: &ConversationRef,
        query: &HistoryQuery,
    ) -> Result<HistoryPage> {
        let Some(log) = self.logs.get(conversation) else {
            return Ok(HistoryPage::default());
        };
        let end = match &query.before {
            Some(cursor) => match log.iter().position(|m| &m.id == cursor) {
                Some(pos) => pos,
                None => return Ok(HistoryPage::default()),
            },
            None => log.len(),
        };
        let start = end.saturating_sub(query.limit);
        let messages: Vec<Message> = log[start..end].iter().rev().cloned().collect();
        let has_more = start > 0;
        let next_before = if has_more {
            messages.last().map(|m| m.id.clone())
        } else {
            None
        };
        Ok(HistoryPage {
            messages,
            has_more,
            next_before,
        })
    }
}

// ── Seed fixture ────────────────────────────────────────────────────────────

/// JSON fixture that populates the in-memory collaborators.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Accepted tokens.
    #[serde(default)]
    pub principals: Vec<SeedPrincipal>,
    /// Sessions to create.
    #[serde(default)]
    pub sessions: Vec<SeedSession>,
    /// Panels to create.
    #[serde(default)]
    pub panels: Vec<Panel>,
}

/// A token and the principal it authenticates as.
#[derive(Clone, Debug, Deserialize)]
pub struct SeedPrincipal {
    /// Bearer token.
    pub token: String,
    /// Identity behind it.
    #[serde(flatten)]
    pub principal: Principal,
}

/// A session in a fixture; validated on apply.
#[derive(Clone, Debug, Deserialize)]
pub struct SeedSession {
    /// Session id.
    pub id: SessionId,
    /// Direct or group.
    pub kind: SessionKind,
    /// Participants.
    pub participants: Vec<IdentityId>,
}

impl Seed {
    /// Load everything into the given collaborators.
    pub fn apply(
        &self,
        directory: &InMemoryDirectory,
        authenticator: &StaticTokenAuthenticator,
    ) -> Result<()> {
        for p in &self.principals {
            authenticator.insert(p.token.clone(), p.principal.clone());
        }
        for s in &self.sessions {
            let session = match s.kind {
                SessionKind::Direct => match s.participants.as_slice() {
                    [a, b] => Session::direct(s.id.clone(), a.clone(), b.clone())?,
                    _ => {
                        return Err(parley_core::CoreError::InvalidDirectSession(
                            s.participants.first().cloned().unwrap_or_else(|| IdentityId::from_raw("")),
                        )
                        .into());
                    }
                },
                SessionKind::Group => Session::group(s.id.clone(), s.participants.clone())?,
            };
            directory.insert_session(session);
        }
        for p in &self.panels {
            directory.insert_panel(p.clone());
        }
        debug!(
            principals = self.principals.len(),
            sessions = self.sessions.len(),
            panels = self.panels.len(),
            "seed applied"
        );
        Ok(())
    }
}
