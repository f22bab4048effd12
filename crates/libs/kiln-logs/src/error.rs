//! Error types for log publishing.

/// Log publishing errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Talking to the Redis broker failed.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// JSON serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The channel refused the message.
    #[error("Failed to publish on {topic}: {reason}")]
    Rejected { topic: String, reason: String },
}
