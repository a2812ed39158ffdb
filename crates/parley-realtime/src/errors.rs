//! Engine error types.
//!
//! Recipient resolution never fails: unknown conversations degrade to an empty
//! recipient set. Errors here come from the connection lifecycle and the
//! write path.

use parley_core::{ConversationRef, CoreError, IdentityId};
use thiserror::Error;

use crate::distributor::ConnectionState;

/// Errors raised by the realtime engine.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The credential was rejected; no connection state was created.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),
    /// The engine has not been started or has been stopped.
    #[error("realtime engine is not running")]
    EngineStopped,
    /// The engine already holds its maximum number of live connections.
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),
    /// A lifecycle transition that the state machine does not allow.
    #[error("invalid connection transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },
    /// The conversation does not exist.
    #[error("conversation not found: {0}")]
    NotFound(ConversationRef),
    /// The identity may not act on this conversation.
    #[error("{identity} may not access {conversation}")]
    AuthorizationDenied {
        /// Acting identity.
        identity: IdentityId,
        /// Target conversation.
        conversation: ConversationRef,
    },
    /// A message failed validation before being written.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// The durable message store failed.
    #[error("message store error: {0}")]
    Store(String),
    /// A domain invariant was violated.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RealtimeError {
    /// Short classification string for logs and wire error codes.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure(_) => "authentication_failure",
            Self::EngineStopped => "engine_stopped",
            Self::ConnectionLimit(_) => "connection_limit",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::InvalidMessage(_) => "invalid_message",
            Self::Store(_) => "store_error",
            Self::Core(_) => "invalid_operation",
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use parley_core::SessionId;

    use super::*;

    #[test]
    fn display_includes_context() {
        let err = RealtimeError::AuthorizationDenied {
            identity: IdentityId::from_raw("u1"),
            conversation: ConversationRef::Session(SessionId::from_raw("s9")),
        };
        assert_eq!(err.to_string(), "u1 may not access session:s9");
        assert_eq!(err.error_kind(), "authorization_denied");
    }

    #[test]
    fn kinds_are_distinct() {
        let not_found =
            RealtimeError::NotFound(ConversationRef::Session(SessionId::from_raw("x")));
        assert_eq!(not_found.error_kind(), "not_found");
        assert_eq!(RealtimeError::EngineStopped.error_kind(), "engine_stopped");
        assert_eq!(
            RealtimeError::AuthenticationFailure("bad token".into()).to_string(),
            "authentication failed: bad token"
        );
    }
}
