//! Sessions and panels.
//!
//! A [`Session`] is private: its participant list is explicit and changes only
//! through [`Session::add_participant`] / [`Session::remove_participant`].
//! A [`Panel`] is a broadcast channel scoped to a workspace whose participant
//! list grows as people post.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};
use crate::ids::{IdentityId, PanelId, SessionId, WorkspaceId};

/// Reference to either kind of conversation.
///
/// Also used as the subscription target type.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ConversationRef {
    /// A private session.
    Session(SessionId),
    /// A broadcast panel.
    Panel(PanelId),
}

impl ConversationRef {
    /// The bare conversation id as sent on the wire.
    pub fn id_str(&self) -> &str {
        match self {
            Self::Session(id) => id.as_str(),
            Self::Panel(id) => id.as_str(),
        }
    }

    /// Whether this is a session reference.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Panel(id) => write!(f, "panel:{id}"),
        }
    }
}

impl From<SessionId> for ConversationRef {
    fn from(id: SessionId) -> Self {
        Self::Session(id)
    }
}

impl From<PanelId> for ConversationRef {
    fn from(id: PanelId) -> Self {
        Self::Panel(id)
    }
}

/// Direct (two people) or group session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Exactly two participants, never changed.
    Direct,
    /// Any number of participants, changed explicitly.
    Group,
}

/// A private conversation with an explicit participant list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id.
    pub id: SessionId,
    /// Direct or group.
    pub kind: SessionKind,
    participants: BTreeSet<IdentityId>,
}

impl Session {
    /// Create a direct session between two distinct identities.
    pub fn direct(id: SessionId, a: IdentityId, b: IdentityId) -> Result<Self> {
        if a == b {
            return Err(CoreError::InvalidDirectSession(a));
        }
        Ok(Self {
            id,
            kind: SessionKind::Direct,
            participants: [a, b].into_iter().collect(),
        })
    }

    /// Create a group session.
    pub fn group(id: SessionId, participants: impl IntoIterator<Item = IdentityId>) -> Result<Self> {
        let participants: BTreeSet<_> = participants.into_iter().collect();
        if participants.is_empty() {
            return Err(CoreError::EmptySession(id));
        }
        Ok(Self {
            id,
            kind: SessionKind::Group,
            participants,
        })
    }

    /// Current participants.
    pub fn participants(&self) -> &BTreeSet<IdentityId> {
        &self.participants
    }

    /// Whether `identity` is a participant.
    pub fn is_participant(&self, identity: &IdentityId) -> bool {
        self.participants.contains(identity)
    }

    /// Add a participant to a group session. Returns `false` if already present.
    pub fn add_participant(&mut self, identity: IdentityId) -> Result<bool> {
        if self.kind == SessionKind::Direct {
            return Err(CoreError::DirectSessionFixed(self.id.clone()));
        }
        Ok(self.participants.insert(identity))
    }

    /// Remove a participant from a group session. Returns `false` if absent.
    pub fn remove_participant(&mut self, identity: &IdentityId) -> Result<bool> {
        if self.kind == SessionKind::Direct {
            return Err(CoreError::DirectSessionFixed(self.id.clone()));
        }
        Ok(self.participants.remove(identity))
    }
}

/// A broadcast channel within a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    /// Panel id.
    pub id: PanelId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Human-readable name.
    pub name: String,
    /// Public panels are visible to everyone in the workspace.
    pub is_public: bool,
    #[serde(default)]
    participants: BTreeSet<IdentityId>,
}

impl Panel {
    /// Create an empty panel.
    pub fn new(
        id: PanelId,
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        is_public: bool,
    ) -> Self {
        Self {
            id,
            workspace_id,
            name: name.into(),
            is_public,
            participants: BTreeSet::new(),
        }
    }

    /// Builder-style participant seeding.
    #[must_use]
    pub fn with_participants(mut self, participants: impl IntoIterator<Item = IdentityId>) -> Self {
        self.participants.extend(participants);
        self
    }

    /// Current participants.
    pub fn participants(&self) -> &BTreeSet<IdentityId> {
        &self.participants
    }

    /// Whether `identity` is a participant.
    pub fn is_participant(&self, identity: &IdentityId) -> bool {
        self.participants.contains(identity)
    }

    /// Public panels are visible to all; private ones only to participants.
    ///
    /// Ignores the workspace; callers acting for a principal want
    /// [`is_visible_in`](Self::is_visible_in).
    pub fn is_visible_to(&self, identity: &IdentityId) -> bool {
        self.is_public || self.is_participant(identity)
    }

    /// Visibility for an identity browsing from `workspace`. Panels of other
    /// workspaces are never visible, public or not.
    pub fn is_visible_in(&self, workspace: &WorkspaceId, identity: &IdentityId) -> bool {
        self.workspace_id == *workspace && self.is_visible_to(identity)
    }

    /// Add a participant. Returns `false` if already present.
    pub fn add_participant(&mut self, identity: IdentityId) -> bool {
        self.participants.insert(identity)
    }
}
