//! # workline-shared
//!
//! Common vocabulary for the Workline chat client core: id newtypes, the
//! domain enums, and cross-crate constants.  Everything here is a plain
//! serde-serializable value type with no behavior beyond construction and
//! display.

pub mod constants;
pub mod types;

pub use types::*;
