//! Out-of-band application services.
//!
//! The sync core never fetches history or tokens itself; callers plug in
//! implementations of these traits. Opening a conversation typically pairs
//! a [`crate::SyncClient`] join with a [`ConversationApi::conversation_messages`]
//! backfill, and [`TokenProvider`] supplies fresh credentials for each
//! connect attempt.

use async_trait::async_trait;
use parley_proto::{ConversationId, ServerMessageId, UserId};

use crate::event::MessageRecord;

/// Errors surfaced by out-of-band service calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Credentials were rejected or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The requested resource does not exist or is not visible.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure reaching the service.
    #[error("request failed: {0}")]
    Request(String),
}

/// Supplies the bearer token presented during the connection handshake.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a token valid for a new session. Called on every connect
    /// attempt so rotation happens naturally across reconnects.
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// Summary row for a conversation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// The other participant.
    pub peer_id: UserId,
    /// Preview of the most recent message, if any.
    pub last_message: Option<String>,
    /// Messages not yet read locally.
    pub unread_count: u64,
}

/// One page of conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    /// Messages in this page, oldest first.
    pub messages: Vec<MessageRecord>,
    /// Cursor for the next older page, or `None` when history is exhausted.
    pub next_before: Option<ServerMessageId>,
}

/// Read-side access to conversation history and listings.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// One page of message history for a conversation.
    ///
    /// `before` is an exclusive upper bound on server message ids; `None`
    /// fetches the newest page. At most `limit` messages are returned,
    /// oldest first within the page. Walking pages means passing the
    /// returned [`MessagePage::next_before`] back in until it is `None`.
    async fn conversation_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<ServerMessageId>,
        limit: u32,
    ) -> Result<MessagePage, ApiError>;

    /// All conversations visible to the current user.
    async fn conversations(&self) -> Result<Vec<ConversationSummary>, ApiError>;
}
