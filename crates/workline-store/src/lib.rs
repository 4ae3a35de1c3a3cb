//! # workline-store
//!
//! The client-side chat state for the Workline application: the
//! date-partitioned [`MessageStore`], the [`ConversationDirectory`] that owns
//! every conversation, and the pure read-side queries derived from them.
//!
//! All mutation funnels through the narrow operation set on
//! [`MessageStore`] and [`ConversationDirectory`]; nothing here performs I/O
//! except whole-directory snapshot persistence in [`snapshot`].

pub mod directory;
pub mod message_store;
pub mod models;
pub mod snapshot;
pub mod views;

mod error;

pub use directory::ConversationDirectory;
pub use error::StoreError;
pub use message_store::{DayGroup, MessageStore};
pub use models::*;
