//! Typed JSON snapshots over a `KeyValueStore`.
//!
//! Each gate persists one snapshot under a fixed key. Reads and writes are
//! best-effort: callers log the error and keep their in-memory value.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::frequency::FrequencyData;
use crate::storage::kv::{KeyValueStore, FREQUENCY_DATA_KEY};

/// Read and decode a JSON value. Missing keys decode to `None`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Serialization {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}

/// One typed snapshot slot in a key-value store.
pub struct SnapshotStore<T> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> SnapshotStore<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Result<Option<T>, StorageError> {
        load_json(self.store.as_ref(), &self.key)
    }

    pub fn save(&self, value: &T) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), &self.key, value)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(&self.key)
    }
}

/// Persistence seam for the frequency policy.
pub trait FrequencyStore: Send + Sync {
    fn load(&self) -> Result<Option<FrequencyData>, StorageError>;
    fn save(&self, data: &FrequencyData) -> Result<(), StorageError>;
}

/// `FrequencyStore` backed by a key-value store.
#[derive(Clone)]
pub struct KvFrequencyStore {
    slot: SnapshotStore<FrequencyData>,
}

impl KvFrequencyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            slot: SnapshotStore::new(store, FREQUENCY_DATA_KEY),
        }
    }
}

impl FrequencyStore for KvFrequencyStore {
    fn load(&self) -> Result<Option<FrequencyData>, StorageError> {
        self.slot.load()
    }

    fn save(&self, data: &FrequencyData) -> Result<(), StorageError> {
        self.slot.save(data)
    }
}
