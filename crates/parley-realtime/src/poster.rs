//! Write path: validate, persist, then distribute.
//!
//! Live distribution runs only after the store acknowledged the write. A
//! store failure surfaces to the caller and nothing is pushed.

use std::sync::Arc;

use metrics::counter;
use parley_core::{
    ConversationRef, Message, MessageDraft, MessageId, PanelId, Principal, SessionId,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::collaborators::{ConversationDirectory, HistoryPage, HistoryQuery, MessageStore};
use crate::distributor::{DistributionReport, EventDistributor};
use crate::errors::{RealtimeError, Result};
use crate::metrics::MESSAGES_POSTED_TOTAL;
use crate::protocol::SenderInfo;

/// History page size bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Used when the caller gives no limit.
    pub default_page_size: usize,
    /// Upper bound for any request.
    pub max_page_size: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

impl HistoryLimits {
    /// Effective limit for a request.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

/// A persisted message and what its distribution did.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOutcome {
    /// The stored message.
    pub message: Message,
    /// Live fan-out result.
    pub report: DistributionReport,
}

/// Posts messages on behalf of verified principals.
pub struct Poster {
    directory: Arc<dyn ConversationDirectory>,
    store: Arc<dyn MessageStore>,
    distributor: Arc<EventDistributor>,
    limits: HistoryLimits,
}

impl Poster {
    /// Create a poster.
    pub fn new(
        directory: Arc<dyn ConversationDirectory>,
        store: Arc<dyn MessageStore>,
        distributor: Arc<EventDistributor>,
        limits: HistoryLimits,
    ) -> Self {
        Self {
            directory,
            store,
            distributor,
            limits,
        }
    }

    /// Post to a session the author participates in.
    #[instrument(skip_all, fields(session_id = %session, author = %author.id))]
    pub async fn post_session_message(
        &self,
        author: &Principal,
        session: &SessionId,
        draft: MessageDraft,
    ) -> Result<PostOutcome> {
        validate(&draft)?;
        let conversation = ConversationRef::Session(session.clone());
        let found = self
            .directory
            .session_by_id(session)
            .await
            .ok_or_else(|| RealtimeError::NotFound(conversation.clone()))?;
        if !found.is_participant(&author.id) {
            return Err(RealtimeError::AuthorizationDenied {
                identity: author.id.clone(),
                conversation,
            });
        }

        let message = Message::new(conversation, author.id.clone(), draft);
        self.store.append(&message).await?;
        counter!(MESSAGES_POSTED_TOTAL, "kind" => "session").increment(1);

        let report = self
            .distributor
            .distribute_session_message(session, &message, &SenderInfo::from(author))
            .await;
        Ok(PostOutcome { message, report })
    }

    /// Post to a panel. First-time posters in a public panel join it.
    #[instrument(skip_all, fields(panel_id = %panel, author = %author.id))]
    pub async fn post_panel_message(
        &self,
        author: &Principal,
        panel: &PanelId,
        draft: MessageDraft,
    ) -> Result<PostOutcome> {
        validate(&draft)?;
        let conversation = ConversationRef::Panel(panel.clone());
        let found = self
            .directory
            .panel_by_id(panel)
            .await
            .ok_or_else(|| RealtimeError::NotFound(conversation.clone()))?;
        if !found.is_visible_in(&author.workspace_id, &author.id) {
            return Err(RealtimeError::AuthorizationDenied {
                identity: author.id.clone(),
                conversation,
            });
        }

        let message = Message::new(conversation, author.id.clone(), draft);
        self.store.append(&message).await?;
        counter!(MESSAGES_POSTED_TOTAL, "kind" => "panel").increment(1);
        if !found.is_participant(&author.id)
            && self.directory.add_panel_participant(panel, &author.id).await
        {
            debug!("first post, author joined panel");
        }

        let report = self
            .distributor
            .distribute_panel_message(panel, &message, &SenderInfo::from(author))
            .await;
        Ok(PostOutcome { message, report })
    }

    /// Read a page of history, newest first, under the same visibility rules
    /// as posting.
    pub async fn history(
        &self,
        viewer: &Principal,
        conversation: &ConversationRef,
        before: Option<MessageId>,
        limit: Option<usize>,
    ) -> Result<HistoryPage> {
        let visible = match conversation {
            ConversationRef::Session(id) => self
                .directory
                .session_by_id(id)
                .await
                .map(|s| s.is_participant(&viewer.id)),
            ConversationRef::Panel(id) => self
                .directory
                .panel_by_id(id)
                .await
                .map(|p| p.is_visible_in(&viewer.workspace_id, &viewer.id)),
        };
        match visible {
            None => Err(RealtimeError::NotFound(conversation.clone())),
            Some(false) => Err(RealtimeError::AuthorizationDenied {
                identity: viewer.id.clone(),
                conversation: conversation.clone(),
            }),
            Some(true) => {
                let query = HistoryQuery {
                    before,
                    limit: self.limits.clamp(limit),
                };
                self.store.history(conversation, &query).await
            }
        }
    }
}

fn validate(draft: &MessageDraft) -> Result<()> {
    if draft.content.trim().is_empty() {
        return Err(RealtimeError::InvalidMessage("content must not be empty".into()));
    }
    Ok(())
}
