//! Branded string identifiers.
//!
//! Generated IDs carry a type prefix followed by a v7 UUID, so they sort by
//! creation time. IDs supplied by collaborators (account ids, conversation ids
//! from the directory) are wrapped verbatim with `from_raw`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered ID.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing ID string.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

branded_id!(
    /// An authenticated participant, human or agent.
    IdentityId,
    "idn"
);
branded_id!(
    /// A private conversation (direct or group).
    SessionId,
    "sess"
);
branded_id!(
    /// A broadcast-style channel within a workspace.
    PanelId,
    "panel"
);
branded_id!(
    /// A single posted message.
    MessageId,
    "msg"
);
branded_id!(
    /// One live transport instance.
    ConnectionId,
    "conn"
);
branded_id!(
    /// The group a panel is scoped to.
    WorkspaceId,
    "ws"
);
