//! Core error types.

use thiserror::Error;

use crate::ids::{IdentityId, SessionId};

/// Errors raised by conversation and message invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A direct session always has exactly its two original participants.
    #[error("direct session {0} has a fixed participant list")]
    DirectSessionFixed(SessionId),
    /// A direct session needs two distinct participants.
    #[error("direct session requires two distinct participants, got {0}")]
    InvalidDirectSession(IdentityId),
    /// A group session was created with nobody in it.
    #[error("session {0} must have at least one participant")]
    EmptySession(SessionId),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
