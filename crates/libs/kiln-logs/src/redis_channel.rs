//! Redis pub/sub broker.

use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::Mutex;
use tracing::{info, trace};

use crate::{channel::LogChannel, prelude::*};

/// Publishes log lines with Redis `PUBLISH`.
///
/// The multiplexed connection is opened by the first publish and shared by
/// the ones after it. A broker that cannot be reached only fails the publish
/// at hand; the next one dials again.
pub struct RedisChannel {
    url: String,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisChannel {
    /// Channel for the broker at `url`, e.g. `redis://localhost:6379`.
    ///
    /// Nothing is dialed until the first publish.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut cached = self.connection.lock().await;
        if let Some(connection) = cached.as_ref() {
            return Ok(connection.clone());
        }
        let client = redis::Client::open(self.url.as_str())?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("Connected to log broker");
        *cached = Some(connection.clone());
        Ok(connection)
    }

    async fn forget_connection(&self) {
        self.connection.lock().await.take();
    }
}

#[async_trait]
impl LogChannel for RedisChannel {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        let mut connection = self.connection().await?;
        let receivers: i64 = match connection.publish(topic, payload).await {
            Ok(receivers) => receivers,
            Err(err) => {
                self.forget_connection().await;
                return Err(err.into());
            }
        };
        trace!("Published on {topic} to {receivers} subscribers");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::LogPublisher;

    // Nothing listens on port 1, so dialing is refused straight away
    const UNREACHABLE: &str = "redis://127.0.0.1:1";

    #[tokio::test]
    async fn unreachable_broker_fails_each_publish() {
        let channel = RedisChannel::new(UNREACHABLE);

        for _ in 0..2 {
            let result = channel.publish("logs:p1", String::from("{}")).await;
            assert!(matches!(result, Err(Error::Redis(_))));
        }
    }

    #[tokio::test]
    async fn malformed_url_fails_the_publish_only() {
        let channel = RedisChannel::new("not a url");
        let result = channel.publish("logs:p1", String::from("{}")).await;
        assert!(matches!(result, Err(Error::Redis(_))));
    }

    #[tokio::test]
    async fn publisher_drains_queue_with_broker_down() {
        let publisher = LogPublisher::spawn(Arc::new(RedisChannel::new(UNREACHABLE)), "p1");
        publisher.publish("Build Started...");
        publisher.publish("Done");

        tokio::time::timeout(std::time::Duration::from_secs(5), publisher.shutdown())
            .await
            .expect("publisher did not shut down");
    }
}
