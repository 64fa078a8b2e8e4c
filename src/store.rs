use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::error::AppError;

/// Key holding the JSON array of every image record, newest first.
pub const IMAGES_KEY: &str = "compressedImages";

/// Key holding the JSON array of activity log entries, newest first.
pub const ACTIVITY_KEY: &str = "activityLogs";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque persistent key-value store. Values are whole serialized documents;
/// there are no partial updates.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Thread-safe in-memory store backed by a DashMap.
///
/// Used by tests and by anyone running the dashboard without a database file;
/// contents are lost when the process exits.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.inner.insert(key.to_owned(), value);
        Ok(())
    }
}

// ── Typed list helpers ─────────────────────────────────────────────────────

/// Read the full list stored under `key`. A missing key is an empty list.
pub async fn load_list<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &'static str,
) -> Result<Vec<T>, AppError> {
    let raw = store
        .get(key)
        .await
        .map_err(|source| AppError::StorageReadFailure { key, source })?;

    match raw {
        None => Ok(Vec::new()),
        Some(json) => serde_json::from_str(&json).map_err(|e| AppError::StorageReadFailure {
            key,
            source: StoreError::Json(e),
        }),
    }
}

/// Overwrite the list stored under `key` with `items`.
pub async fn save_list<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &'static str,
    items: &[T],
) -> Result<(), AppError> {
    let json = serde_json::to_string(items).map_err(|e| AppError::StorageWriteFailure {
        key,
        source: StoreError::Json(e),
    })?;

    store
        .set(key, json)
        .await
        .map_err(|source| AppError::StorageWriteFailure { key, source })
}
