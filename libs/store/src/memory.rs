//! In-memory store backend.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Store, StoreError};

/// Process-lifetime map backend. No durability; the map itself is not
/// concurrency-safe, so the store carries its own lock.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, T>> {
        // A poisoned lock only means another thread panicked mid-write;
        // the map itself is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Store<T> for MemoryStore<T>
where
    T: Clone + Send + Sync,
{
    fn put(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<T, StoreError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("a", &"hello".to_string()).unwrap();

        assert_eq!(store.get("a").unwrap(), "hello");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store: MemoryStore<String> = MemoryStore::new();
        let err = store.get("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn put_overwrites() {
        let store = MemoryStore::new();
        store.put("a", &1u32).unwrap();
        store.put("a", &2u32).unwrap();

        assert_eq!(store.get("a").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn list_returns_all_values() {
        let store = MemoryStore::new();
        store.put("a", &1u32).unwrap();
        store.put("b", &2u32).unwrap();

        let mut values = store.list().unwrap();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }
}
