/// Session Validator
///
/// The only code that decides whether the persisted credentials are usable.
/// Every failure path clears the store, so the store never holds a partial
/// or stale session after a validation pass. The clear only applies to the
/// contents that were judged; a session written concurrently by another
/// context is read again rather than wiped.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::claims::decode_claims;
use super::expiry::ExpiryBroadcast;
use super::model::{Admin, Session};
use crate::storage::{StoredCredentials, TokenStore};

// Re-reads allowed when another writer keeps changing the store.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// `accessToken` or `admin` absent, or `admin` not a profile
    MissingCredentials,
    /// Token payload could not be decoded
    MalformedToken,
    Expired,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::MissingCredentials => "missing_credentials",
            InvalidReason::MalformedToken => "malformed_token",
            InvalidReason::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Authenticated(Session),
    Unauthenticated(InvalidReason),
}

impl Validation {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Validation::Authenticated(_))
    }
}

#[derive(Clone)]
pub struct SessionValidator {
    store: Arc<dyn TokenStore>,
    expiry: ExpiryBroadcast,
}

impl SessionValidator {
    pub fn new(store: Arc<dyn TokenStore>, expiry: ExpiryBroadcast) -> Self {
        Self { store, expiry }
    }

    pub fn validate(&self) -> Validation {
        self.validate_at(Utc::now())
    }

    /// Validate against an explicit clock reading.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Validation {
        let mut attempt = 1;
        loop {
            let stored = self.store.read();
            let reason = match Self::evaluate(&stored, now) {
                Ok(session) => return Validation::Authenticated(session),
                Err(reason) => reason,
            };

            if self.discard(&stored) {
                tracing::info!(reason = reason.as_str(), "Session is not usable");
                if reason == InvalidReason::Expired {
                    self.expiry.emit();
                }
                return Validation::Unauthenticated(reason);
            }
            if attempt == MAX_ATTEMPTS {
                tracing::warn!(reason = reason.as_str(), "Token store kept changing during validation");
                return Validation::Unauthenticated(reason);
            }
            attempt += 1;
            tracing::debug!("Token store changed during validation, reading again");
        }
    }

    fn evaluate(stored: &StoredCredentials, now: DateTime<Utc>) -> Result<Session, InvalidReason> {
        let (Some(access_token), Some(raw_admin)) = (&stored.access_token, &stored.admin) else {
            return Err(InvalidReason::MissingCredentials);
        };

        let claims = decode_claims(access_token).map_err(|e| {
            tracing::warn!(error = %e, "Stored access token is undecodable");
            InvalidReason::MalformedToken
        })?;

        if claims.is_expired_at(now) {
            return Err(InvalidReason::Expired);
        }

        let admin: Admin = serde_json::from_str(raw_admin).map_err(|e| {
            tracing::warn!(error = %e, "Stored admin profile is unreadable");
            InvalidReason::MissingCredentials
        })?;

        Ok(Session {
            access_token: access_token.clone(),
            refresh_token: stored.refresh_token.clone(),
            admin,
            expires_at: claims.expires_at(),
        })
    }

    /// Clear what was read, unless someone wrote in the meantime.
    fn discard(&self, stored: &StoredCredentials) -> bool {
        match self.store.clear_if_unchanged(stored) {
            Ok(cleared) => cleared,
            Err(e) => {
                tracing::error!(error = %e, "Failed to clear token store");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::{MemoryStore, StorageKey};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const ADMIN_JSON: &str = r#"{"id":"42","name":"Ana Ruiz","email":"ana@club.org"}"#;

    fn token_expiring_at(exp: i64) -> String {
        encode(
            &Header::default(),
            &serde_json::json!({ "exp": exp, "sub": "42" }),
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, ExpiryBroadcast, SessionValidator) {
        let store = Arc::new(MemoryStore::new());
        let expiry = ExpiryBroadcast::new();
        let validator = SessionValidator::new(store.clone(), expiry.clone());
        (store, expiry, validator)
    }

    #[test]
    fn test_empty_store_is_unauthenticated() {
        let (_, _, validator) = setup();
        assert_eq!(
            validator.validate(),
            Validation::Unauthenticated(InvalidReason::MissingCredentials)
        );
    }

    #[test]
    fn test_partial_store_is_cleared() {
        let (store, _, validator) = setup();
        store.set(StorageKey::RefreshToken, "r-1").unwrap();
        store
            .set(StorageKey::AccessToken, &token_expiring_at(Utc::now().timestamp() + 3600))
            .unwrap();

        assert!(!validator.validate().is_authenticated());
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_malformed_token_is_cleared_without_broadcast() {
        let (store, expiry, validator) = setup();
        let mut events = expiry.subscribe();
        store.set(StorageKey::AccessToken, "garbage").unwrap();
        store.set(StorageKey::Admin, ADMIN_JSON).unwrap();

        assert_eq!(
            validator.validate(),
            Validation::Unauthenticated(InvalidReason::MalformedToken)
        );
        assert!(store.read().is_empty());
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_expired_token_broadcasts_once() {
        let (store, expiry, validator) = setup();
        let mut events = expiry.subscribe();
        let now = Utc::now();
        store
            .set(StorageKey::AccessToken, &token_expiring_at(now.timestamp() - 1))
            .unwrap();
        store.set(StorageKey::Admin, ADMIN_JSON).unwrap();

        assert_eq!(
            validator.validate_at(now),
            Validation::Unauthenticated(InvalidReason::Expired)
        );
        assert!(store.read().is_empty());
        assert!(events.try_recv().is_some());
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_unreadable_admin_is_cleared() {
        let (store, _, validator) = setup();
        store
            .set(StorageKey::AccessToken, &token_expiring_at(Utc::now().timestamp() + 3600))
            .unwrap();
        store.set(StorageKey::Admin, "not json").unwrap();

        assert_eq!(
            validator.validate(),
            Validation::Unauthenticated(InvalidReason::MissingCredentials)
        );
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_valid_session() {
        let (store, _, validator) = setup();
        let exp = Utc::now().timestamp() + 3600;
        store.set(StorageKey::AccessToken, &token_expiring_at(exp)).unwrap();
        store.set(StorageKey::Admin, ADMIN_JSON).unwrap();

        match validator.validate() {
            Validation::Authenticated(session) => {
                assert_eq!(session.admin.name, "Ana Ruiz");
                assert_eq!(session.expires_at.timestamp(), exp);
                assert!(session.refresh_token.is_none());
            }
            other => panic!("expected authenticated, got {:?}", other),
        }
        assert!(!store.read().is_empty());
    }

    /// Lands a fresh session right before the first conditional clear, as
    /// another context logging in would.
    struct ConcurrentLogin {
        inner: MemoryStore,
        pending: std::sync::Mutex<Option<String>>,
    }

    impl TokenStore for ConcurrentLogin {
        fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }
        fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
        fn set_all(&self, entries: &[(StorageKey, &str)]) -> Result<(), StorageError> {
            self.inner.set_all(entries)
        }
        fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
        fn snapshot(&self) -> Result<StoredCredentials, StorageError> {
            self.inner.snapshot()
        }
        fn clear(&self) -> Result<(), StorageError> {
            self.inner.clear()
        }
        fn clear_if_unchanged(&self, seen: &StoredCredentials) -> Result<bool, StorageError> {
            if let Some(token) = self.pending.lock().unwrap().take() {
                self.inner.set_all(&[
                    (StorageKey::AccessToken, token.as_str()),
                    (StorageKey::Admin, ADMIN_JSON),
                ])?;
            }
            self.inner.clear_if_unchanged(seen)
        }
        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::storage::StorageEvent> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn test_concurrent_login_is_not_wiped() {
        let store = Arc::new(ConcurrentLogin {
            inner: MemoryStore::new(),
            pending: std::sync::Mutex::new(Some(token_expiring_at(Utc::now().timestamp() + 3600))),
        });
        let validator = SessionValidator::new(store.clone(), ExpiryBroadcast::new());

        assert!(validator.validate().is_authenticated());
        assert!(store.read().access_token.is_some());
    }
}
