/// Session Context
///
/// Owns the process-wide `AuthState`. All mutation goes through `initialize`,
/// `check_token_validity`, `login`, `logout` and `handle_token_expired`; each
/// updates the token store and the state under one lock, so the two never
/// disagree once the operation returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::expiry::ExpiryBroadcast;
use super::model::{Admin, SessionPayload};
use super::validator::{SessionValidator, Validation};
use crate::error::{AppError, ErrorContext};
use crate::navigation::Navigator;
use crate::storage::TokenStore;

/// What the rest of the console sees of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub admin: Option<Admin>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            is_authenticated: false,
            is_loading: true,
            admin: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            is_loading: false,
            admin: None,
        }
    }

    pub fn authenticated(admin: Admin) -> Self {
        Self {
            is_authenticated: true,
            is_loading: false,
            admin: Some(admin),
        }
    }
}

/// One-shot initialization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    Uninitialized,
    Initializing,
    Ready,
}

pub struct SessionContext {
    store: Arc<dyn TokenStore>,
    validator: SessionValidator,
    expiry: ExpiryBroadcast,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    phase: Mutex<InitPhase>,
    state: watch::Sender<Arc<AuthState>>,
    // Serializes store + state mutations.
    op_lock: Mutex<()>,
}

impl SessionContext {
    pub fn new(
        store: Arc<dyn TokenStore>,
        expiry: ExpiryBroadcast,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(AuthState::loading()));
        Self {
            validator: SessionValidator::new(store.clone(), expiry.clone()),
            store,
            expiry,
            navigator,
            login_route: login_route.into(),
            phase: Mutex::new(InitPhase::Uninitialized),
            state,
            op_lock: Mutex::new(()),
        }
    }

    pub fn auth_state(&self) -> Arc<AuthState> {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn admin(&self) -> Option<Admin> {
        self.state.borrow().admin.clone()
    }

    /// Observe state changes. Only real transitions are published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AuthState>> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> InitPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn expiry(&self) -> &ExpiryBroadcast {
        &self.expiry
    }

    /// Run the startup validation pass. Only the first call validates; later
    /// calls return the current state untouched.
    pub fn initialize(&self) -> bool {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase != InitPhase::Uninitialized {
                return self.is_authenticated();
            }
            *phase = InitPhase::Initializing;
        }

        let authenticated = self.check_token_validity();

        self.state.send_if_modified(|current| {
            if !current.is_loading {
                return false;
            }
            *current = Arc::new(AuthState {
                is_loading: false,
                ..(**current).clone()
            });
            true
        });
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = InitPhase::Ready;

        tracing::info!(authenticated = authenticated, "Session initialized");
        authenticated
    }

    /// Validate the stored session and reconcile `AuthState` with the result.
    ///
    /// The state is replaced only when the authenticated flag or the admin
    /// changes, so repeated checks of a valid session keep the same `Arc`.
    pub fn check_token_validity(&self) -> bool {
        let _guard = self.lock_ops();
        let validation = self.validator.validate();
        let authenticated = validation.is_authenticated();

        self.state.send_if_modified(|current| match &validation {
            Validation::Authenticated(session) => {
                if current.is_authenticated && current.admin.as_ref() == Some(&session.admin) {
                    return false;
                }
                *current = Arc::new(AuthState {
                    is_authenticated: true,
                    is_loading: current.is_loading,
                    admin: Some(session.admin.clone()),
                });
                true
            }
            Validation::Unauthenticated(_) => Self::reset(current),
        });

        authenticated
    }

    /// Persist a session returned by the backend and mark it authenticated.
    ///
    /// The payload is trusted as-is. If it cannot be persisted the store is
    /// cleared and the state is left logged out.
    pub fn login(&self, payload: SessionPayload) -> Result<(), AppError> {
        let _guard = self.lock_ops();

        if let Err(e) = self.store.save(&payload) {
            let err = AppError::from(e);
            ErrorContext::new("session_login")
                .with_admin_id(payload.admin.id.clone())
                .log_error(&err);
            if let Err(e) = self.store.clear() {
                tracing::error!(error = %e, "Failed to clear partially written session");
            }
            self.state.send_if_modified(Self::reset);
            return Err(err);
        }

        let admin_id = payload.admin.id.clone();
        let admin = payload.admin;
        self.state.send_if_modified(|current| {
            if current.is_authenticated && current.admin.as_ref() == Some(&admin) {
                return false;
            }
            *current = Arc::new(AuthState {
                is_authenticated: true,
                is_loading: current.is_loading,
                admin: Some(admin),
            });
            true
        });

        tracing::info!(admin_id = %admin_id, "Admin logged in");
        Ok(())
    }

    /// Clear the session and send the console to the login route.
    pub fn logout(&self) {
        let admin_id = self.admin().map(|admin| admin.id);
        self.clear_session();
        tracing::info!(admin_id = ?admin_id, "Admin logged out");
        self.navigator.navigate(&self.login_route);
    }

    /// React to a `tokenExpired` event: same clearing as `logout`, without
    /// the navigation. Returns whether the state changed.
    pub fn handle_token_expired(&self) -> bool {
        let changed = self.clear_session();
        if changed {
            tracing::info!("Session expired");
        }
        changed
    }

    /// Subscribe to the expiry broadcast and to storage changes.
    ///
    /// Subscriptions are taken before this returns, so no event sent after
    /// the call is missed. Dropping the returned handle unsubscribes.
    pub fn spawn_listeners(self: &Arc<Self>) -> SessionListeners {
        let mut expiry = self.expiry.subscribe();
        let context = Arc::clone(self);
        let expiry_task = tokio::spawn(async move {
            while expiry.recv().await.is_some() {
                context.handle_token_expired();
            }
        });

        let mut storage = self.store.subscribe();
        let context = Arc::clone(self);
        let storage_task = tokio::spawn(async move {
            loop {
                match storage.recv().await {
                    Ok(event) => {
                        tracing::debug!(key = ?event.key.map(|k| k.as_str()), "Storage changed");
                        context.check_token_validity();
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        context.check_token_validity();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SessionListeners {
            tasks: vec![expiry_task, storage_task],
        }
    }

    fn clear_session(&self) -> bool {
        let _guard = self.lock_ops();
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear token store");
        }
        self.state.send_if_modified(Self::reset)
    }

    fn reset(current: &mut Arc<AuthState>) -> bool {
        if !current.is_authenticated && current.admin.is_none() {
            return false;
        }
        *current = Arc::new(AuthState {
            is_authenticated: false,
            is_loading: current.is_loading,
            admin: None,
        });
        true
    }

    fn lock_ops(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background subscriptions of a `SessionContext`. Aborted on drop.
pub struct SessionListeners {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for SessionListeners {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
