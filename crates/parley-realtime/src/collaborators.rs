//! Contracts the engine consumes from the rest of the platform.
//!
//! Authentication, conversation management and durable storage are owned
//! elsewhere; the engine only needs the narrow views below.

use async_trait::async_trait;
use parley_core::{
    ConversationRef, IdentityId, Message, MessageId, Panel, PanelId, Principal, Session,
    SessionId, WorkspaceId,
};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Turns a presented credential into a verified [`Principal`].
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Verify `credential`, returning
    /// [`RealtimeError::AuthenticationFailure`](crate::RealtimeError::AuthenticationFailure)
    /// on rejection.
    async fn verify(&self, credential: &str) -> Result<Principal>;
}

/// Read access to sessions and panels, plus the one mutation the write path
/// needs (auto-adding first-time panel posters).
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// Look up a session.
    async fn session_by_id(&self, id: &SessionId) -> Option<Session>;

    /// Look up a panel.
    async fn panel_by_id(&self, id: &PanelId) -> Option<Panel>;

    /// Sessions `identity` participates in, for wildcard snapshots.
    async fn sessions_for_identity(&self, identity: &IdentityId) -> Vec<SessionId>;

    /// Panels in `workspace`, for wildcard snapshots. Callers filter by visibility.
    async fn panels_for_workspace(&self, workspace: &WorkspaceId) -> Vec<Panel>;

    /// Add `identity` to a panel's participants. Returns `false` if already
    /// present or the panel does not exist.
    async fn add_panel_participant(&self, panel: &PanelId, identity: &IdentityId) -> bool;
}

/// Durable message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Distribution happens only after this returns `Ok`.
    async fn append(&self, message: &Message) -> Result<()>;

    /// Read one page of a conversation's history, newest first.
    async fn history(&self, conversation: &ConversationRef, query: &HistoryQuery)
    -> Result<HistoryPage>;
}

/// Page request for [`MessageStore::history`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Return only messages older than this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<MessageId>,
    /// Maximum messages to return.
    pub limit: usize,
}

/// One page of history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Messages, newest first.
    pub messages: Vec<Message>,
    /// Whether older messages remain.
    pub has_more: bool,
    /// Cursor for the next (older) page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_before: Option<MessageId>,
}
