//! Verified participants.

use serde::{Deserialize, Serialize};

use crate::ids::{IdentityId, WorkspaceId};

/// Whether a participant is a person or an automated agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    /// A person using a client application.
    Human,
    /// An automated agent.
    Agent,
}

/// A participant whose credential has been verified.
///
/// Produced by the authentication collaborator and carried by every live
/// connection; the distributor never sees unverified identities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable account identity.
    pub id: IdentityId,
    /// Name shown next to messages.
    pub display_name: String,
    /// Human or agent.
    pub kind: ParticipantKind,
    /// Workspace whose panels this identity can browse.
    pub workspace_id: WorkspaceId,
}

impl Principal {
    /// Build a principal.
    pub fn new(
        id: impl Into<IdentityId>,
        display_name: impl Into<String>,
        kind: ParticipantKind,
        workspace_id: impl Into<WorkspaceId>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            workspace_id: workspace_id.into(),
        }
    }
}
