//! Wire protocol: inbound subscription commands, their acks, and outbound
//! message events.
//!
//! Inbound frames look like
//! `{"id":"r1","method":"subscribe-session","params":{"ids":["s1"]}}`, where
//! `ids` may also be a single string or the wildcard `"*"` (subscribe only).

use chrono::{DateTime, Utc};
use parley_core::{
    ConnectionId, IdentityId, Message, MessageId, Metadata, PanelId, ParticipantKind, Principal,
    SessionId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type for session messages.
pub const SESSION_MESSAGE: &str = "session-message";
/// Event type for panel messages.
pub const PANEL_MESSAGE: &str = "panel-message";
/// Event type sent once after a successful handshake.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
/// Marker accepted in place of an id list for wildcard subscribe.
pub const WILDCARD: &str = "*";

/// A raw inbound command frame.
#[derive(Clone, Debug, Deserialize)]
pub struct CommandFrame {
    /// Correlation id echoed in the ack.
    #[serde(default)]
    pub id: Option<String>,
    /// Command name.
    pub method: String,
    /// Command parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Either every visible conversation or an explicit list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Targets<T> {
    /// Expand over the identity's current snapshot.
    Wildcard,
    /// Specific ids.
    Ids(Vec<T>),
}

/// A parsed subscription command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `subscribe-session`
    SubscribeSession(Targets<SessionId>),
    /// `unsubscribe-session`
    UnsubscribeSession(Vec<SessionId>),
    /// `subscribe-panel`
    SubscribePanel(Targets<PanelId>),
    /// `unsubscribe-panel`
    UnsubscribePanel(Vec<PanelId>),
}

impl Command {
    /// Build a command from a method name and its params.
    pub fn parse(method: &str, params: Option<&Value>) -> Result<Self, String> {
        let ids = params.and_then(|p| p.get("ids"));
        match method {
            "subscribe-session" => Ok(Self::SubscribeSession(parse_targets(ids)?)),
            "subscribe-panel" => Ok(Self::SubscribePanel(parse_targets(ids)?)),
            "unsubscribe-session" => Ok(Self::UnsubscribeSession(parse_ids(ids)?)),
            "unsubscribe-panel" => Ok(Self::UnsubscribePanel(parse_ids(ids)?)),
            other => Err(format!("unknown method: {other}")),
        }
    }

    /// Wire name of the command.
    pub fn method(&self) -> &'static str {
        match self {
            Self::SubscribeSession(_) => "subscribe-session",
            Self::UnsubscribeSession(_) => "unsubscribe-session",
            Self::SubscribePanel(_) => "subscribe-panel",
            Self::UnsubscribePanel(_) => "unsubscribe-panel",
        }
    }
}

fn parse_targets<T: From<String>>(ids: Option<&Value>) -> Result<Targets<T>, String> {
    match ids {
        Some(Value::String(s)) if s == WILDCARD => Ok(Targets::Wildcard),
        other => parse_ids(other).map(Targets::Ids),
    }
}

fn parse_ids<T: From<String>>(ids: Option<&Value>) -> Result<Vec<T>, String> {
    match ids {
        Some(Value::String(s)) if s == WILDCARD => {
            Err("wildcard is only valid for subscribe".into())
        }
        Some(Value::String(s)) if !s.is_empty() => Ok(vec![T::from(s.clone())]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) if !s.is_empty() && s != WILDCARD => Ok(T::from(s.clone())),
                _ => Err("ids must be non-empty strings".to_string()),
            })
            .collect(),
        _ => Err("missing ids".into()),
    }
}

/// Acknowledgement for one inbound command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Always `"ack"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Echo of the command id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Whether the command was accepted.
    pub result: bool,
    /// Reason for rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// Accepted.
    pub fn ok(id: Option<String>) -> Self {
        Self {
            kind: "ack".into(),
            id,
            result: true,
            error: None,
        }
    }

    /// Rejected with a reason.
    pub fn err(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            kind: "ack".into(),
            id,
            result: false,
            error: Some(error.into()),
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Author details shipped alongside every message event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    /// Author identity.
    pub id: IdentityId,
    /// Display name.
    pub display_name: String,
    /// Human or agent.
    pub kind: ParticipantKind,
}

impl From<&Principal> for SenderInfo {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id.clone(),
            display_name: p.display_name.clone(),
            kind: p.kind,
        }
    }
}

/// The message as clients see it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Message id.
    pub id: MessageId,
    /// Author identity.
    pub sender_id: IdentityId,
    /// Body.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Replied-to message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Mention tokens captured at creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl From<&Message> for MessagePayload {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            sender_id: m.author.clone(),
            content: m.content.clone(),
            timestamp: m.created_at,
            reply_to: m.reply_to.clone(),
            mentions: m.mentions().to_vec(),
            metadata: m.metadata.clone(),
        }
    }
}

/// Body of a `session-message` / `panel-message` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Bare session or panel id.
    pub conversation_id: String,
    /// The message.
    pub message: MessagePayload,
    /// Its author.
    pub sender: SenderInfo,
}

/// Outbound event frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Event name.
    #[serde(rename = "type")]
    pub kind: String,
    /// When the frame was produced.
    pub timestamp: DateTime<Utc>,
    /// Event body.
    pub data: T,
}

impl<T> EventEnvelope<T> {
    /// Wrap `data` with the current time.
    pub fn new(kind: impl Into<String>, data: T) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Body of the `connection.established` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablished {
    /// Server-assigned connection id.
    pub connection_id: ConnectionId,
    /// Verified identity.
    pub identity_id: IdentityId,
}
