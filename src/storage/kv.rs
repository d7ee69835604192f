//! Key-value store contract and in-memory implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::StorageError;

/// Key under which `FrequencyData` is persisted.
pub const FREQUENCY_DATA_KEY: &str = "adgate.frequency_data";
/// Key under which the last `ConsentInfo` snapshot is persisted.
pub const CONSENT_INFO_KEY: &str = "adgate.consent_info";
/// Key under which the last `NetworkState` snapshot is persisted.
pub const NETWORK_STATE_KEY: &str = "adgate.network_state";

/// Durable string key-value store provided by the host platform.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store. Used in tests and as the fallback when no durable
/// backend is wired.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Store whose every operation fails, for degraded-persistence tests.
    #[derive(Debug, Default)]
    pub struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Read {
                key: key.to_string(),
                message: "disk unavailable".to_string(),
            })
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Write {
                key: key.to_string(),
                message: "disk full".to_string(),
            })
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            Err(StorageError::Write {
                key: key.to_string(),
                message: "disk full".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip_and_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_failing_store_reports_key() {
        let store = testing::FailingStore;
        let err = store.set(FREQUENCY_DATA_KEY, "{}").unwrap_err();
        assert!(err.to_string().contains(FREQUENCY_DATA_KEY));
    }
}
