//! Engine configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the engine can run with zero
//! configuration.

use workline_shared::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_PAGE_SIZE, DEFAULT_UPLOAD_FOLDER,
};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size for chat-list and history pagination.
    /// Env: `WORKLINE_PAGE_SIZE`
    /// Default: `20`
    pub page_size: u32,

    /// Whether inbound messages schedule local notifications.
    /// Env: `WORKLINE_NOTIFICATIONS` (true/false)
    /// Default: `true`
    pub notifications_enabled: bool,

    /// Fixed UTC offset in minutes used for calendar-day message grouping.
    /// Env: `WORKLINE_TZ_OFFSET_MINUTES`
    /// Default: `0`
    pub tz_offset_minutes: i32,

    /// Remote folder for uploaded chat attachments.
    /// Env: `WORKLINE_UPLOAD_FOLDER`
    /// Default: `chat-attachments`
    pub upload_folder: String,

    /// Capacity of the transport command/event channels.
    /// Env: `WORKLINE_CHANNEL_CAPACITY`
    /// Default: `64`
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            notifications_enabled: true,
            tz_offset_minutes: 0,
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the environment, falling back to defaults
    /// for unset or unparsable variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_size: env_parse("WORKLINE_PAGE_SIZE", defaults.page_size),
            notifications_enabled: env_parse(
                "WORKLINE_NOTIFICATIONS",
                defaults.notifications_enabled,
            ),
            tz_offset_minutes: env_parse("WORKLINE_TZ_OFFSET_MINUTES", defaults.tz_offset_minutes),
            upload_folder: std::env::var("WORKLINE_UPLOAD_FOLDER")
                .unwrap_or(defaults.upload_folder),
            channel_capacity: env_parse("WORKLINE_CHANNEL_CAPACITY", defaults.channel_capacity),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
