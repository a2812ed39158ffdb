//! # parley-core
//!
//! Foundation types shared by every Parley crate:
//!
//! - **Branded IDs**: `IdentityId`, `SessionId`, `PanelId`, `MessageId`,
//!   `ConnectionId`, `WorkspaceId` as newtypes for type safety
//! - **Identity**: `Principal` (a verified participant) and `ParticipantKind`
//! - **Conversations**: `Session` (fixed participants) and `Panel` (growing
//!   participants, public/private), addressed by `ConversationRef`
//! - **Messages**: `Message` with its mention set computed once at creation and
//!   a typed metadata map
//! - **Mentions**: lexical mention extraction and mention-all detection
//! - **Errors**: `CoreError` via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod conversation;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod mentions;
pub mod message;

pub use conversation::{ConversationRef, Panel, Session, SessionKind};
pub use errors::{CoreError, Result};
pub use identity::{ParticipantKind, Principal};
pub use ids::{ConnectionId, IdentityId, MessageId, PanelId, SessionId, WorkspaceId};
pub use message::{Message, MessageDraft, Metadata, MetadataValue};
