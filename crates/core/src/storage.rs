use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Persistent key/value store seam (`localStorage` in the browser host).
///
/// Callers above this trait never see storage failures: the JSON helpers
/// below swallow and log them, and the affected call simply proceeds without
/// persistence.
pub trait StateStorage {
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
}

/// Serialize and store a value. Returns whether the value was persisted;
/// serialization and storage failures are logged, not raised.
pub fn save_json<T: Serialize + ?Sized>(
    storage: &mut dyn StateStorage,
    key: &str,
    value: &T,
) -> bool {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("failed to serialize {key:?}: {err}");
            return false;
        }
    };
    match storage.set(key, &text) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("failed to persist {key:?}: {err}");
            false
        }
    }
}

/// Load and deserialize a value. Missing keys, storage failures, and corrupt
/// payloads all come back as `None`; the latter two are logged.
pub fn load_json<T: DeserializeOwned>(storage: &dyn StateStorage, key: &str) -> Option<T> {
    let text = match storage.get(key) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(err) => {
            log::warn!("failed to read {key:?}: {err}");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("corrupt payload under {key:?}: {err}");
            None
        }
    }
}

/// Hash-map storage, used by the wasm bridge (the host mirrors it into
/// `localStorage`) and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl StateStorage for MemoryStorage {
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStorage;

    impl StateStorage for BrokenStorage {
        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::QuotaExceeded)
        }

        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("gone".into()))
        }
    }

    #[test]
    fn round_trips_json_values() {
        let mut storage = MemoryStorage::new();
        assert!(save_json(&mut storage, "k", &vec![1, 2, 3]));
        assert_eq!(load_json::<Vec<i32>>(&storage, "k"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn missing_key_is_none() {
        let storage = MemoryStorage::new();
        assert_eq!(load_json::<Vec<i32>>(&storage, "nope"), None);
    }

    #[test]
    fn corrupt_payload_is_none() {
        let mut storage = MemoryStorage::new();
        storage.set("k", "{not json").unwrap();
        assert_eq!(load_json::<Vec<i32>>(&storage, "k"), None);
    }

    #[test]
    fn failures_are_swallowed() {
        let mut storage = BrokenStorage;
        assert!(!save_json(&mut storage, "k", &1));
        assert_eq!(load_json::<i32>(&storage, "k"), None);
    }
}
