use thiserror::Error;

/// Errors produced by the store layer.
///
/// Store mutations themselves are infallible: a lookup miss on
/// `replace`/`remove` is a silent no-op, not an error.  Failures can only
/// come from snapshot persistence.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Generic I/O error while reading or writing a snapshot file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("Snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
