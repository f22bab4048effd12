//! In-process broker that keeps everything it is given.

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use crate::{channel::LogChannel, prelude::*, publisher::LogMessage};

/// Records every published `(topic, payload)` pair.
///
/// Can reject single lines or everything, to exercise delivery errors.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    published: Mutex<Vec<(String, String)>>,
    rejected_logs: Mutex<HashSet<String>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reject any message whose `log` text is exactly `log`.
    pub fn reject_log(&self, log: impl Into<String>) {
        if let Ok(mut rejected) = self.rejected_logs.lock() {
            rejected.insert(log.into());
        }
    }

    /// Number of publish calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// All `(topic, payload)` pairs accepted so far.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// The `log` text of every accepted payload, in order.
    pub fn logs(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_str::<LogMessage>(&payload).ok())
            .map(|message| message.log)
            .collect()
    }

    fn rejects(&self, payload: &str) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        let Ok(message) = serde_json::from_str::<LogMessage>(payload) else {
            return false;
        };
        self.rejected_logs
            .lock()
            .map(|rejected| rejected.contains(&message.log))
            .unwrap_or(false)
    }
}

#[async_trait]
impl LogChannel for MemoryChannel {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.rejects(&payload) {
            return Err(Error::Rejected {
                topic: topic.to_string(),
                reason: String::from("rejected by memory channel"),
            });
        }
        match self.published.lock() {
            Ok(mut published) => {
                published.push((topic.to_string(), payload));
                Ok(())
            }
            Err(_) => Err(Error::Rejected {
                topic: topic.to_string(),
                reason: String::from("channel lock poisoned"),
            }),
        }
    }
}
