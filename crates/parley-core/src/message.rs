//! Posted messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationRef;
use crate::ids::{IdentityId, MessageId};
use crate::mentions::extract_mentions;

/// A serializable metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// JSON `null`.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    String(String),
    /// Ordered list of values.
    List(Vec<MetadataValue>),
    /// Nested string-keyed map.
    Map(BTreeMap<String, MetadataValue>),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

/// String-keyed message metadata.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// The client-supplied part of a new message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    /// Message text.
    pub content: String,
    /// Message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl MessageDraft {
    /// Draft with only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// A message as persisted and distributed.
///
/// The mention set is computed from the body once, when the message is
/// created, and is not recomputed by [`Message::edit`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Conversation the message was posted to.
    pub conversation: ConversationRef,
    /// Author identity.
    pub author: IdentityId,
    /// Current body.
    pub content: String,
    /// Message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    mentions: Vec<String>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time, if edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a message, assigning an id and timestamp and scanning mentions.
    pub fn new(conversation: ConversationRef, author: IdentityId, draft: MessageDraft) -> Self {
        let mentions = extract_mentions(&draft.content);
        Self {
            id: MessageId::new(),
            conversation,
            author,
            content: draft.content,
            reply_to: draft.reply_to,
            mentions,
            metadata: draft.metadata,
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    /// Mention tokens captured at creation, in first-occurrence order.
    pub fn mentions(&self) -> &[String] {
        &self.mentions
    }

    /// Whether `identity` was mentioned when the message was created.
    pub fn mentions_identity(&self, identity: &IdentityId) -> bool {
        self.mentions.iter().any(|m| m == identity.as_str())
    }

    /// Replace the body. The mention set is left as it was at creation.
    pub fn edit(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.edited_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use crate::ids::SessionId;

    use super::*;

    fn session_msg(body: &str) -> Message {
        Message::new(
            ConversationRef::Session(SessionId::from_raw("s1")),
            IdentityId::from_raw("agent-1"),
            MessageDraft::text(body),
        )
    }

    #[test]
    fn mentions_computed_at_creation() {
        let msg = session_msg("@u2 and @u3");
        assert_eq!(msg.mentions(), ["u2", "u3"]);
        assert!(msg.mentions_identity(&IdentityId::from_raw("u2")));
        assert!(!msg.mentions_identity(&IdentityId::from_raw("u4")));
    }

    #[test]
    fn edit_keeps_original_mentions() {
        let mut msg = session_msg("@u2 look");
        msg.edit("@u9 actually you");
        assert_eq!(msg.content, "@u9 actually you");
        assert_eq!(msg.mentions(), ["u2"]);
        assert!(msg.edited_at.is_some());
    }

    #[test]
    fn metadata_values_roundtrip_through_json() {
        let mut draft = MessageDraft::text("hi");
        let _ = draft.metadata.insert("priority".into(), MetadataValue::Integer(2));
        let _ = draft.metadata.insert("tags".into(), MetadataValue::List(vec!["a".into(), "b".into()]));
        let _ = draft.metadata.insert("urgent".into(), true.into());

        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["metadata"]["priority"], 2);
        assert_eq!(json["metadata"]["tags"][1], "b");

        let back: MessageDraft = serde_json::from_value(json).unwrap();
        assert_eq!(back, draft);
    }

    #[test]
    fn draft_accepts_minimal_json() {
        let draft: MessageDraft = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(draft.content, "hello");
        assert!(draft.reply_to.is_none());
        assert!(draft.metadata.is_empty());
    }
}
