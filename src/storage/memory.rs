use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use super::{ChangeNotifier, StorageEvent, StorageKey, StoredCredentials, TokenStore};
use crate::error::StorageError;

/// In-process store. Share one instance behind an `Arc` to model several
/// console tabs over the same storage area.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StorageKey, String>>,
    notifier: ChangeNotifier,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            notifier: ChangeNotifier::new(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<StorageKey, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let previous = self.entries().insert(key, value.to_string());
        if previous.as_deref() != Some(value) {
            self.notifier.notify(Some(key));
        }
        Ok(())
    }

    fn set_all(&self, entries: &[(StorageKey, &str)]) -> Result<(), StorageError> {
        let changed = {
            let mut current = self.entries();
            let mut changed = false;
            for (key, value) in entries {
                let previous = current.insert(*key, value.to_string());
                changed |= previous.as_deref() != Some(*value);
            }
            changed
        };
        if changed {
            self.notifier.notify(None);
        }
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        if self.entries().remove(&key).is_some() {
            self.notifier.notify(Some(key));
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<StoredCredentials, StorageError> {
        let entries = self.entries();
        Ok(StoredCredentials::from_lookup(|key| entries.get(&key).cloned()))
    }

    fn clear(&self) -> Result<(), StorageError> {
        let had_entries = {
            let mut entries = self.entries();
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        };
        if had_entries {
            self.notifier.notify(None);
        }
        Ok(())
    }

    fn clear_if_unchanged(&self, seen: &StoredCredentials) -> Result<bool, StorageError> {
        let had_entries = {
            let mut entries = self.entries();
            let current = StoredCredentials::from_lookup(|key| entries.get(&key).cloned());
            if current != *seen {
                return Ok(false);
            }
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        };
        if had_entries {
            self.notifier.notify(None);
        }
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_publishes_event() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        store.set(StorageKey::AccessToken, "a.b.c").unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            StorageEvent { key: Some(StorageKey::AccessToken) }
        );
    }

    #[test]
    fn test_unchanged_value_publishes_nothing() {
        let store = MemoryStore::new();
        store.set(StorageKey::AccessToken, "a.b.c").unwrap();
        let mut events = store.subscribe();

        store.set(StorageKey::AccessToken, "a.b.c").unwrap();

        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_clear_on_empty_store_publishes_nothing() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        store.clear().unwrap();

        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_clear_publishes_single_event() {
        let store = MemoryStore::new();
        store.set(StorageKey::AccessToken, "a.b.c").unwrap();
        store.set(StorageKey::Admin, "{}").unwrap();
        let mut events = store.subscribe();

        store.clear().unwrap();

        assert_eq!(events.try_recv().unwrap(), StorageEvent { key: None });
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_set_all_is_one_change() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        store
            .set_all(&[(StorageKey::AccessToken, "a.b.c"), (StorageKey::Admin, "{}")])
            .unwrap();
        store
            .set_all(&[(StorageKey::AccessToken, "a.b.c"), (StorageKey::Admin, "{}")])
            .unwrap();

        assert_eq!(events.try_recv().unwrap(), StorageEvent { key: None });
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();
        store.remove(StorageKey::RefreshToken).unwrap();
        assert!(events.try_recv().is_err());
    }
}
