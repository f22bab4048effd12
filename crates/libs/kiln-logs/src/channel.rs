//! Broker seam.

use async_trait::async_trait;

use crate::prelude::*;

/// A pub/sub broker that can deliver a payload on a topic.
#[async_trait]
pub trait LogChannel: Send + Sync {
    /// Publish one payload on `topic`.
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}
