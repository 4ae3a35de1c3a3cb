//! Shared constants used across the client core.

/// Default page size for chat-list and message-history pagination.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default remote folder for uploaded chat attachments.
pub const DEFAULT_UPLOAD_FOLDER: &str = "chat-attachments";

/// Default capacity of the transport command/event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
