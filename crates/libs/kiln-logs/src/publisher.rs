//! Ordered, fire-and-forget log publisher.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

use crate::{channel::LogChannel, prelude::*};

/// Wire format of one log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub log: String,
}

impl LogMessage {
    pub fn new(log: impl Into<String>) -> Self {
        Self { log: log.into() }
    }

    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Topic carrying the logs of `project_id`.
pub fn topic_for(project_id: &str) -> String {
    format!("logs:{project_id}")
}

/// Publishes log lines for one project.
///
/// [`publish`](LogPublisher::publish) only queues the line, so callers never
/// wait on the broker. A single background task delivers queued lines in the
/// order they were queued and logs, then drops, any line the broker rejects.
pub struct LogPublisher {
    topic: String,
    tx: mpsc::UnboundedSender<String>,
    worker: JoinHandle<()>,
}

impl LogPublisher {
    /// Start publishing on the topic of `project_id` through `channel`.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn(channel: Arc<dyn LogChannel>, project_id: &str) -> Self {
        let topic = topic_for(project_id);
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(deliver(channel, topic.clone(), rx));
        Self { topic, tx, worker }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Queue `text` for delivery. Never blocks and never fails.
    pub fn publish(&self, text: impl Into<String>) {
        if self.tx.send(text.into()).is_err() {
            warn!("Log delivery for {} has stopped, dropping line", self.topic);
        }
    }

    /// Stop accepting lines and wait until everything queued was handled.
    pub async fn shutdown(self) {
        let Self { topic, tx, worker } = self;
        drop(tx);
        if let Err(err) = worker.await {
            error!("Log delivery for {topic} ended abnormally - {err}");
        }
    }
}

async fn deliver(
    channel: Arc<dyn LogChannel>,
    topic: String,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = rx.recv().await {
        let payload = match LogMessage::new(text).to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to encode log line - {err}");
                continue;
            }
        };
        if let Err(err) = channel.publish(&topic, payload).await {
            warn!("Failed to publish log on {topic} - {err}");
        }
    }
    debug!("Log delivery for {topic} finished");
}
