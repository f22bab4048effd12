//! In-process object store.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::store::{ObjectStore, StorageError};

/// An object as it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Keeps objects in memory and fails chosen keys on demand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_keys: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put of `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        if let Ok(mut failing) = self.failing_keys.lock() {
            failing.insert(key.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every key a put was attempted for, in call order.
    pub fn attempted_keys(&self) -> Vec<String> {
        self.attempts
            .lock()
            .map(|attempts| attempts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(key.to_string());
        }
        let failing = self
            .failing_keys
            .lock()
            .map(|failing| failing.contains(key))
            .unwrap_or(false);
        if failing {
            return Err(StorageError::new(format!("Access Denied for {key}")));
        }
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StorageError::new("object map lock poisoned"))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.map(String::from),
            },
        );
        Ok(())
    }
}
