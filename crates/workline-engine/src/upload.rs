//! File-upload collaborator interface.

use async_trait::async_trait;
use thiserror::Error;

use workline_shared::MessageKind;
use workline_store::models::LocalFile;

/// Upload failure; scoped to the one message being sent.
#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    Failed(String),
}

/// Result of a completed upload: the durable URL to store on the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub url: String,
}

/// Uploads a locally picked file and returns its durable URL.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(
        &self,
        file: &LocalFile,
        kind: MessageKind,
        folder: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<UploadedFile, UploadError>;
}
