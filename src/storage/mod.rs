/// Token Store
///
/// Durable key-value persistence for the three session keys. Backends only
/// provide raw get/set/remove/clear; the session-shaped `save` and `read`
/// live on the trait so every backend treats partial data the same way.
///
/// Every mutation that changes a value publishes a `StorageEvent`, the
/// equivalent of the browser's `storage` event, so other session contexts
/// sharing the store ("tabs") can re-validate.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::session::SessionPayload;

const EVENT_CAPACITY: usize = 32;

/// The persisted keys. The string forms are the storage key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    Admin,
}

impl StorageKey {
    pub const ALL: [StorageKey; 3] = [
        StorageKey::AccessToken,
        StorageKey::RefreshToken,
        StorageKey::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AccessToken => "accessToken",
            StorageKey::RefreshToken => "refreshToken",
            StorageKey::Admin => "admin",
        }
    }
}

/// A change to the store. `key` is `None` when several keys changed at once
/// (a whole session written, the store cleared, or an external writer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<StorageKey>,
}

/// Raw contents of the store; each field is `None` when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub admin: Option<String>,
}

impl StoredCredentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.admin.is_none()
    }

    pub(crate) fn from_lookup(mut lookup: impl FnMut(StorageKey) -> Option<String>) -> Self {
        Self {
            access_token: lookup(StorageKey::AccessToken),
            refresh_token: lookup(StorageKey::RefreshToken),
            admin: lookup(StorageKey::Admin),
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;

    /// Write several keys as one change. Readers never observe a subset,
    /// and at most one event is published.
    fn set_all(&self, entries: &[(StorageKey, &str)]) -> Result<(), StorageError>;

    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;

    /// All keys as of a single point in time.
    fn snapshot(&self) -> Result<StoredCredentials, StorageError>;

    /// Remove every session key. Clearing an empty store is a no-op and
    /// publishes no event.
    fn clear(&self) -> Result<(), StorageError>;

    /// Clear only if the store still holds `seen`. Returns `false` when
    /// another writer got there first and nothing was touched.
    fn clear_if_unchanged(&self, seen: &StoredCredentials) -> Result<bool, StorageError>;

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    /// Write all three keys of a session in one transaction.
    fn save(&self, session: &SessionPayload) -> Result<(), StorageError> {
        let admin = serde_json::to_string(&session.admin)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.set_all(&[
            (StorageKey::AccessToken, session.access_token.as_str()),
            (StorageKey::RefreshToken, session.refresh_token.as_str()),
            (StorageKey::Admin, admin.as_str()),
        ])
    }

    /// Read all three keys. Never fails: an unreadable store is reported as
    /// empty.
    fn read(&self) -> StoredCredentials {
        self.snapshot().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable token store treated as empty");
            StoredCredentials::default()
        })
    }
}

/// Fan-out of storage events shared by the backends.
#[derive(Debug, Clone)]
pub(crate) struct ChangeNotifier {
    sender: broadcast::Sender<StorageEvent>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn notify(&self, key: Option<StorageKey>) {
        // No subscribers is fine.
        let _ = self.sender.send(StorageEvent { key });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }
}
