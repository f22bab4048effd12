//! Object storage seam.

use async_trait::async_trait;

/// Why a single put-object call failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Durable storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, tagging it with `content_type` when known.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;
}
