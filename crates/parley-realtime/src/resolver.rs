//! Recipient resolution.
//!
//! Sessions deliver to participants plus subscribers; panels deliver to
//! subscribers. In both cases the author is excluded. Mentions never remove
//! anyone from a recipient set, they only select the [`Rationale`].
//!
//! Unknown conversations resolve to nobody with [`Rationale::NotFound`]; this
//! module has no error path.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use parley_core::mentions::is_mention_all;
use parley_core::{ConversationRef, IdentityId, Message, PanelId, SessionId};
use serde::Serialize;

use crate::collaborators::ConversationDirectory;
use crate::subscriptions::SubscriptionIndex;

/// Why a set of recipients was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Rationale {
    /// Message in a session.
    #[serde(rename = "session-message")]
    SessionMessage,
    /// Panel message containing `@all`, `@everyone`, `@channel` or `@here`.
    #[serde(rename = "mention-all")]
    MentionAll,
    /// Panel message mentioning at least one identity.
    #[serde(rename = "direct-mention")]
    DirectMention,
    /// Plain panel message.
    #[serde(rename = "panel-message")]
    PanelMessage,
    /// The conversation could not be found.
    #[serde(rename = "not found")]
    NotFound,
}

impl Rationale {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionMessage => "session-message",
            Self::MentionAll => "mention-all",
            Self::DirectMention => "direct-mention",
            Self::PanelMessage => "panel-message",
            Self::NotFound => "not found",
        }
    }
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-message routing result. Computed fresh for every message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    /// Identities that receive the event.
    pub recipients: BTreeSet<IdentityId>,
    /// Whether recipients should be alerted rather than just updated.
    pub notify: bool,
    /// Why.
    pub rationale: Rationale,
}

impl RoutingDecision {
    /// Empty decision for a conversation that does not exist.
    pub fn not_found() -> Self {
        Self {
            recipients: BTreeSet::new(),
            notify: false,
            rationale: Rationale::NotFound,
        }
    }
}

/// Session routing: `(participants ∪ subscribers) \ {author}`, always notifying.
pub fn session_decision<'a>(
    participants: impl IntoIterator<Item = &'a IdentityId>,
    subscribers: &'a HashSet<IdentityId>,
    author: &IdentityId,
) -> RoutingDecision {
    let recipients = participants
        .into_iter()
        .chain(subscribers)
        .filter(|id| *id != author)
        .cloned()
        .collect();
    RoutingDecision {
        recipients,
        notify: true,
        rationale: Rationale::SessionMessage,
    }
}

/// Panel routing: `subscribers \ {author}`; mentions only pick the rationale.
pub fn panel_decision(
    subscribers: &HashSet<IdentityId>,
    message: &Message,
    author: &IdentityId,
) -> RoutingDecision {
    let recipients = subscribers
        .iter()
        .filter(|id| *id != author)
        .cloned()
        .collect();
    let (notify, rationale) = if is_mention_all(&message.content) {
        (true, Rationale::MentionAll)
    } else if message.mentions().is_empty() {
        (false, Rationale::PanelMessage)
    } else {
        (true, Rationale::DirectMention)
    };
    RoutingDecision {
        recipients,
        notify,
        rationale,
    }
}

/// Whether `identity` should be alerted immediately about `message`.
///
/// Independent of recipient membership: always `true` in sessions; in panels
/// only when the identity is mentioned or the body mentions everyone.
pub fn should_notify_immediately(message: &Message, identity: &IdentityId, is_session: bool) -> bool {
    is_session || message.mentions_identity(identity) || is_mention_all(&message.content)
}

/// Combines the conversation directory and the subscription index.
#[derive(Clone)]
pub struct RecipientResolver {
    directory: Arc<dyn ConversationDirectory>,
    subscriptions: Arc<SubscriptionIndex>,
}

impl RecipientResolver {
    /// Create a resolver.
    pub fn new(
        directory: Arc<dyn ConversationDirectory>,
        subscriptions: Arc<SubscriptionIndex>,
    ) -> Self {
        Self {
            directory,
            subscriptions,
        }
    }

    /// Recipients of a session message.
    pub async fn resolve_session(
        &self,
        session: &SessionId,
        message: &Message,
    ) -> RoutingDecision {
        let Some(found) = self.directory.session_by_id(session).await else {
            return RoutingDecision::not_found();
        };
        let subscribers = self
            .subscriptions
            .subscribers_of(&ConversationRef::Session(session.clone()));
        session_decision(found.participants(), &subscribers, &message.author)
    }

    /// Recipients of a panel message.
    pub async fn resolve_panel(&self, panel: &PanelId, message: &Message) -> RoutingDecision {
        if self.directory.panel_by_id(panel).await.is_none() {
            return RoutingDecision::not_found();
        }
        let subscribers = self
            .subscriptions
            .subscribers_of(&ConversationRef::Panel(panel.clone()));
        panel_decision(&subscribers, message, &message.author)
    }
}
