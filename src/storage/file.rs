use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;

use super::{ChangeNotifier, StorageEvent, StorageKey, StoredCredentials, TokenStore};
use crate::error::StorageError;

type Entries = BTreeMap<String, String>;

/// Store backed by a JSON object on disk, keyed by the storage key names.
///
/// The file is re-read on every access. Writes go through a temporary file
/// and a rename. Writes made by other processes are only announced once
/// `watch` has been called.
pub struct FileStore {
    shared: Arc<Shared>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

struct Shared {
    path: PathBuf,
    write_lock: Mutex<()>,
    notifier: ChangeNotifier,
    // Contents as last written or observed by this instance; `None` while
    // the file is unreadable.
    last_seen: Mutex<Option<Entries>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                write_lock: Mutex::new(()),
                notifier: ChangeNotifier::new(),
                last_seen: Mutex::new(None),
            }),
            watcher: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Watch the file for writes made outside this instance and publish a
    /// `StorageEvent` for each one that changes the contents.
    pub fn watch(&self) -> Result<(), StorageError> {
        let file_name = self
            .shared
            .path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| {
                StorageError::Io(format!("{} is not a file path", self.shared.path.display()))
            })?;
        let dir = match self.shared.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        {
            let _guard = self.shared.lock();
            *self.shared.last_seen() = self.shared.load().ok();
        }

        let shared = Arc::clone(&self.shared);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        shared.reload();
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Token store watcher error"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::debug!(path = %self.shared.path.display(), "Watching token store file");
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        Ok(())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_seen(&self) -> MutexGuard<'_, Option<Entries>> {
        self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<Entries, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            StorageError::Corrupted(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Must be called with the write lock held.
    fn persist(&self, entries: &Entries) -> Result<(), StorageError> {
        if entries.is_empty() {
            return self.remove_file();
        }

        let body = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        *self.last_seen() = Some(entries.clone());
        Ok(())
    }

    /// Must be called with the write lock held.
    fn remove_file(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *self.last_seen() = Some(Entries::new());
        Ok(())
    }

    // Watcher callback; our own writes hold the lock until `last_seen` is
    // current, so they compare equal here.
    fn reload(&self) {
        let changed = {
            let _guard = self.lock();
            let current = self.load().ok();
            let mut last_seen = self.last_seen();
            if *last_seen == current {
                false
            } else {
                *last_seen = current;
                true
            }
        };
        if changed {
            tracing::debug!(path = %self.path.display(), "Token store changed on disk");
            self.notifier.notify(None);
        }
    }
}

fn credentials(entries: &Entries) -> StoredCredentials {
    StoredCredentials::from_lookup(|key| entries.get(key.as_str()).cloned())
}

impl TokenStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let _guard = self.shared.lock();
        Ok(self.shared.load()?.remove(key.as_str()))
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        self.set_all(&[(key, value)])?;
        Ok(())
    }

    fn set_all(&self, entries: &[(StorageKey, &str)]) -> Result<(), StorageError> {
        let changed = {
            let _guard = self.shared.lock();
            let mut current = self.shared.load()?;
            let mut changed = false;
            for (key, value) in entries {
                let previous = current.insert(key.as_str().to_string(), value.to_string());
                changed |= previous.as_deref() != Some(*value);
            }
            if changed {
                self.shared.persist(&current)?;
            }
            changed
        };
        if changed {
            let key = match entries {
                [(key, _)] => Some(*key),
                _ => None,
            };
            self.shared.notifier.notify(key);
        }
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let removed = {
            let _guard = self.shared.lock();
            let mut entries = self.shared.load()?;
            let removed = entries.remove(key.as_str()).is_some();
            if removed {
                self.shared.persist(&entries)?;
            }
            removed
        };
        if removed {
            self.shared.notifier.notify(Some(key));
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<StoredCredentials, StorageError> {
        let _guard = self.shared.lock();
        Ok(credentials(&self.shared.load()?))
    }

    fn clear(&self) -> Result<(), StorageError> {
        let had_entries = {
            let _guard = self.shared.lock();
            // A corrupted file counts as content to clear.
            let had_entries = self.shared.load().map(|e| !e.is_empty()).unwrap_or(true);
            if had_entries {
                self.shared.remove_file()?;
            }
            had_entries
        };
        if had_entries {
            tracing::debug!(path = %self.shared.path.display(), "Token store file removed");
            self.shared.notifier.notify(None);
        }
        Ok(())
    }

    fn clear_if_unchanged(&self, seen: &StoredCredentials) -> Result<bool, StorageError> {
        let had_entries = {
            let _guard = self.shared.lock();
            let had_entries = match self.shared.load() {
                Ok(entries) => {
                    if credentials(&entries) != *seen {
                        return Ok(false);
                    }
                    !entries.is_empty()
                }
                // Unreadable contents read as empty.
                Err(StorageError::Corrupted(_)) if seen.is_empty() => true,
                Err(e) => return Err(e),
            };
            if had_entries {
                self.shared.remove_file()?;
            }
            had_entries
        };
        if had_entries {
            self.shared.notifier.notify(None);
        }
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.notifier.subscribe()
    }
}
