use thiserror::Error;

use workline_shared::ChatId;

use crate::api::ApiError;
use crate::upload::UploadError;

/// Errors surfaced by the reconciliation engine.
///
/// Per-message send failures are *not* errors: they are converted into
/// `MessageStatus::Failed` on the message itself, and the UI observes them
/// through that field.
#[derive(Error, Debug)]
pub enum EngineError {
    /// REST collaborator failure on a non-send operation (listing,
    /// block/mute, group edit).
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Upload collaborator failure outside the send pipeline.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// The referenced conversation is not in the local directory.
    #[error("Unknown chat: {0}")]
    UnknownChat(ChatId),

    /// The local actor has no active participant record in the conversation.
    #[error("Not a participant of chat: {0}")]
    NotAParticipant(ChatId),

    /// The transport command channel is closed (adapter torn down).
    #[error("Transport channel closed")]
    ChannelClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
