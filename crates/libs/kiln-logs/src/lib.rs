//! Live build log publishing for the kiln worker.
//!
//! Every log line is serialized as `{"log": "<text>"}` and published on the
//! `logs:{project_id}` topic of a pub/sub broker. Publishing is best effort:
//! the pipeline never waits on or fails because of the broker.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_logs::{LogPublisher, redis_channel::RedisChannel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let channel = RedisChannel::new("redis://localhost:6379");
//!     let publisher = LogPublisher::spawn(Arc::new(channel), "proj123");
//!
//!     publisher.publish("Build Started...");
//!     publisher.shutdown().await;
//! }
//! ```

pub mod channel;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod publisher;
pub mod redis_channel;

pub use channel::LogChannel;
pub use publisher::{LogMessage, LogPublisher, topic_for};
