//! # parley-realtime
//!
//! The live delivery engine: decides, for every posted message, which
//! connections must be notified, and pushes to them.
//!
//! - [`ConnectionRegistry`]: identity ⇄ live connections
//! - [`SubscriptionIndex`]: identity ⇄ conversation targets
//! - [`RecipientResolver`]: participants + subscriptions + mentions → recipients
//! - [`EventDistributor`]: connection lifecycle, subscribe commands, fan-out
//! - [`Poster`]: the write path that persists and then distributes
//!
//! Collaborators (authentication, conversation directory, message store) are
//! traits in [`collaborators`], with in-memory implementations in [`memory`].

#![deny(unsafe_code)]

pub mod collaborators;
pub mod connection;
pub mod distributor;
pub mod errors;
pub mod memory;
pub mod metrics;
pub mod poster;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod subscriptions;

pub use collaborators::{
    AuthenticationProvider, ConversationDirectory, HistoryPage, HistoryQuery, MessageStore,
};
pub use connection::ClientConnection;
pub use distributor::{ConnectionHandle, ConnectionState, DistributionReport, EventDistributor};
pub use errors::{RealtimeError, Result};
pub use memory::{InMemoryDirectory, InMemoryMessageStore, Seed, StaticTokenAuthenticator};
pub use poster::{HistoryLimits, PostOutcome, Poster};
pub use protocol::{Ack, Command, SenderInfo, Targets};
pub use registry::ConnectionRegistry;
pub use resolver::{Rationale, RecipientResolver, RoutingDecision, should_notify_immediately};
pub use subscriptions::SubscriptionIndex;
