//! # workline-engine
//!
//! The reconciliation engine of the Workline chat client: consumes inbound
//! events from the transport adapter and user-initiated actions, applies them
//! to the shared [`ConversationDirectory`](workline_store::ConversationDirectory)
//! under idempotent merge rules, and drives the optimistic send pipeline
//! (upload, create, replace-in-place).
//!
//! The engine assumes at-least-once delivery from the transport: every merge
//! is keyed by stable identity and safe to apply in any order, so
//! double-delivered events around a reconnect window are harmless.

pub mod api;
pub mod config;
pub mod engine;
pub mod logging;
pub mod notify;
pub mod transport;
pub mod upload;

mod error;

pub use api::{ApiError, ChatApi, NewMessage};
pub use config::EngineConfig;
pub use engine::{spawn_engine, SyncEngine};
pub use error::EngineError;
pub use notify::{NotificationId, NotificationScheduler};
pub use transport::{AdapterEnd, ChatEvent, TransportCommand, TransportHandle};
pub use upload::{FileUploader, UploadError, UploadedFile};
