//! REST history/CRUD collaborator interface.
//!
//! The server owns durable storage and fan-out; this trait is the client's
//! view of its paginated history and CRUD endpoints.  Implementations live
//! outside this crate (HTTP client, test fakes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use workline_shared::{AccountId, ChatId, ChatKind, MessageKind, ParticipantId};
use workline_store::models::{Chat, GroupPatch, Message};

/// Transport-level failure of a REST call.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Connection/timeout failure; retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected the request.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Payload for the create-message endpoint.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub sender_id: ParticipantId,
    pub kind: MessageKind,
    pub text: Option<String>,
    /// Durable URL of an already-uploaded attachment.
    pub file_url: Option<String>,
}

/// Paginated history and CRUD endpoints of the chat backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(
        &self,
        page: u32,
        page_size: u32,
        search: Option<&str>,
    ) -> Result<Vec<Chat>, ApiError>;

    async fn list_messages(
        &self,
        chat_id: &ChatId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Message>, ApiError>;

    /// Create a message; the response is the server-confirmed message
    /// carrying the server-issued id and timestamps.
    async fn create_message(&self, message: NewMessage) -> Result<Message, ApiError>;

    async fn create_chat(
        &self,
        accounts: &[AccountId],
        kind: ChatKind,
        group_name: Option<&str>,
    ) -> Result<Chat, ApiError>;

    async fn edit_group(&self, chat_id: &ChatId, patch: &GroupPatch) -> Result<(), ApiError>;

    async fn block_participant(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
    ) -> Result<(), ApiError>;

    async fn unblock_participant(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
    ) -> Result<(), ApiError>;

    async fn mute_participant(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
        muted_till: DateTime<Utc>,
    ) -> Result<(), ApiError>;

    async fn unmute_participant(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
    ) -> Result<(), ApiError>;

    async fn delete_chat(&self, chat_id: &ChatId) -> Result<(), ApiError>;
}
