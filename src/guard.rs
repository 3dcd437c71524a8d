/// Route Guard
///
/// Decides whether the current route may render given the session state.
/// `decide` is the pure rule; `RouteGuard` wraps it with the per-mount
/// redirect latch and the reaction to `tokenExpired`.

use crate::configuration::RouteSettings;
use crate::session::AuthState;

/// Outcome of the routing rule for one (state, path) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session still initializing; show a loading indicator only
    Wait,
    Allow,
    Redirect(String),
}

/// Strip query, fragment and trailing slashes so `/players/?page=2`
/// matches `/players`.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = path[..end].trim_end_matches('/');
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Whether two routes name the same page.
pub fn same_route(a: &str, b: &str) -> bool {
    normalize_path(a) == normalize_path(b)
}

pub fn is_public(routes: &RouteSettings, path: &str) -> bool {
    same_route(path, &routes.login)
        || same_route(path, &routes.unauthorized)
        || routes.public.iter().any(|route| same_route(route, path))
}

pub fn decide(routes: &RouteSettings, state: &AuthState, path: &str) -> RouteDecision {
    if state.is_loading {
        return RouteDecision::Wait;
    }

    let path = normalize_path(path);

    if is_public(routes, path) {
        if state.is_authenticated && same_route(path, &routes.login) {
            return RouteDecision::Redirect(routes.home.clone());
        }
        return RouteDecision::Allow;
    }

    if !state.is_authenticated {
        return RouteDecision::Redirect(routes.login.clone());
    }

    RouteDecision::Allow
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Allowed,
    Redirecting { to: String },
}

/// What the host should do after an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    ShowLoading,
    /// Render the page; `with_header` is set for protected routes
    Render { with_header: bool },
    Navigate(String),
    /// A redirect is already in flight for this mount
    Hold,
}

/// A mounted guard.
#[derive(Debug)]
pub struct RouteGuard {
    routes: RouteSettings,
    state: GuardState,
    mounted_path: Option<String>,
    has_checked: bool,
    force_login: bool,
}

impl RouteGuard {
    pub fn new(routes: RouteSettings) -> Self {
        Self {
            routes,
            state: GuardState::Checking,
            mounted_path: None,
            has_checked: false,
            force_login: false,
        }
    }

    pub fn routes(&self) -> &RouteSettings {
        &self.routes
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    /// Evaluate on a path change or an `AuthState` change.
    pub fn evaluate(&mut self, path: &str, auth: &AuthState) -> GuardAction {
        let path = normalize_path(path);

        if self.mounted_path.as_deref() != Some(path) {
            // Navigation completed; the previous redirect is done.
            self.mounted_path = Some(path.to_string());
            self.has_checked = false;
        }

        if auth.is_loading {
            self.state = GuardState::Checking;
            return GuardAction::ShowLoading;
        }

        let decision = if self.force_login && !same_route(path, &self.routes.login) {
            RouteDecision::Redirect(self.routes.login.clone())
        } else {
            decide(&self.routes, auth, path)
        };
        self.force_login = false;

        match decision {
            RouteDecision::Wait => {
                self.state = GuardState::Checking;
                GuardAction::ShowLoading
            }
            RouteDecision::Allow => {
                self.state = GuardState::Allowed;
                GuardAction::Render {
                    with_header: !is_public(&self.routes, path),
                }
            }
            RouteDecision::Redirect(to) => {
                let latched = self.has_checked
                    && matches!(&self.state, GuardState::Redirecting { to: pending } if *pending == to);
                if latched {
                    return GuardAction::Hold;
                }
                self.has_checked = true;
                self.state = GuardState::Redirecting { to: to.clone() };
                tracing::debug!(from = path, to = %to, "Route guard redirect");
                GuardAction::Navigate(to)
            }
        }
    }

    /// Reset the latch and send the next evaluation to the login route.
    pub fn on_token_expired(&mut self) {
        self.has_checked = false;
        self.force_login = true;
    }
}
