/// Interactive admin console
///
/// Hosts the route guard: every route change, session change or
/// `tokenExpired` event re-renders the current route through the guard.

mod command;
mod pages;

pub use command::{Command, CommandError};
pub use pages::item_title;

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::api_client::{ApiClient, Resource};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::guard::{normalize_path, same_route, GuardAction, RouteGuard};
use crate::navigation::{History, Navigator};
use crate::session::{AuthState, SessionContext};
use crate::validators::validate_login_form;

pub struct Console<W> {
    session: Arc<SessionContext>,
    api: ApiClient,
    history: Arc<History>,
    guard: RouteGuard,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(
        session: Arc<SessionContext>,
        api: ApiClient,
        history: Arc<History>,
        guard: RouteGuard,
        out: W,
    ) -> Self {
        Self {
            session,
            api,
            history,
            guard,
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Read commands until `quit` or end of input.
    pub async fn run<R>(&mut self, input: R) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut auth_changes = self.session.subscribe();
        let mut route_changes = self.history.subscribe();
        let mut expiry = self.session.expiry().subscribe();

        auth_changes.borrow_and_update();
        route_changes.borrow_and_update();
        self.render().await?;

        loop {
            tokio::select! {
                biased;

                Some(_) = expiry.recv() => {
                    self.session.handle_token_expired();
                    self.guard.on_token_expired();
                    writeln!(self.out, "Your session has expired.")?;
                }
                Ok(()) = auth_changes.changed() => {}
                Ok(()) = route_changes.changed() => {}
                line = lines.next_line() => {
                    let line = line.map_err(|e| AppError::Internal(format!("Failed to read input: {}", e)))?;
                    let Some(line) = line else { break };
                    match Command::parse(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => self.execute(command).await?,
                        Ok(None) => {}
                        Err(e) => writeln!(self.out, "{}", e)?,
                    }
                    continue;
                }
            }

            // One render covers every change observed so far.
            auth_changes.borrow_and_update();
            route_changes.borrow_and_update();
            self.render().await?;
        }

        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> Result<(), AppError> {
        match command {
            Command::Go(path) => {
                if same_route(&path, &self.history.current()) {
                    self.render().await?;
                } else {
                    self.history.navigate(&path);
                }
            }
            Command::Login { email, password } => self.login(&email, &password).await?,
            Command::Logout => self.session.logout(),
            Command::Status => {
                let auth = self.session.auth_state();
                pages::status(&mut self.out, &auth, &self.history.current())?;
            }
            Command::Reload => self.render().await?,
            Command::Help => pages::help(&mut self.out)?,
            Command::Quit => {}
        }
        Ok(())
    }

    /// Evaluate the guard for the current route and act on it.
    pub async fn render(&mut self) -> Result<(), AppError> {
        let path = self.history.current();
        let auth = self.session.auth_state();

        match self.guard.evaluate(&path, &auth) {
            GuardAction::ShowLoading => writeln!(self.out, "Checking session...")?,
            GuardAction::Hold => {}
            GuardAction::Navigate(to) => {
                writeln!(self.out, "Redirecting to {}", to)?;
                self.history.navigate(&to);
            }
            GuardAction::Render { with_header } => {
                if with_header {
                    pages::header(&mut self.out, auth.admin.as_ref())?;
                }
                self.render_page(normalize_path(&path), &auth).await?;
            }
        }

        self.out.flush()?;
        Ok(())
    }

    async fn render_page(&mut self, path: &str, auth: &AuthState) -> Result<(), AppError> {
        let routes = self.guard.routes().clone();

        if same_route(path, &routes.login) {
            pages::login_form(&mut self.out)?;
        } else if same_route(path, &routes.unauthorized) {
            pages::unauthorized(&mut self.out)?;
        } else if same_route(path, &routes.home) {
            pages::home(&mut self.out, auth.admin.as_ref())?;
        } else if let Some(resource) = Resource::from_route(path) {
            self.render_collection(resource).await?;
        } else {
            pages::not_found(&mut self.out, path)?;
        }
        Ok(())
    }

    async fn render_collection(&mut self, resource: Resource) -> Result<(), AppError> {
        writeln!(self.out, "Loading {}...", resource.label().to_lowercase())?;
        self.out.flush()?;

        let result = self.api.fetch_collection(resource).await;

        // The session may have ended while the request was in flight.
        if !self.session.is_authenticated() {
            tracing::debug!(resource = resource.segment(), "Discarding response received after logout");
            return Ok(());
        }

        match result {
            Ok(items) => pages::collection(&mut self.out, resource, &items)?,
            // The expiry broadcast drives the redirect.
            Err(e) if e.is_session_expired() => {}
            // The store lost the session (another console logged out).
            Err(AppError::Auth(AuthError::NotAuthenticated)) => {
                self.session.check_token_validity();
            }
            Err(e) => {
                ErrorContext::new(format!("fetch_{}", resource.segment())).log_error(&e);
                writeln!(
                    self.out,
                    "Could not load {}: {}",
                    resource.label().to_lowercase(),
                    e.user_message()
                )?;
            }
        }
        Ok(())
    }

    async fn login(&mut self, email: &str, password: &str) -> Result<(), AppError> {
        let request = match validate_login_form(email, password) {
            Ok(request) => request,
            Err(e) => {
                writeln!(self.out, "{}", e)?;
                return Ok(());
            }
        };

        writeln!(self.out, "Signing in...")?;
        self.out.flush()?;

        let outcome = match self.api.login(&request).await {
            Ok(payload) => self.session.login(payload),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            ErrorContext::new("admin_login").log_error(&e);
            writeln!(self.out, "{}", e.user_message())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{ApiSettings, RouteSettings};
    use crate::session::{Admin, ExpiryBroadcast, SessionPayload};
    use crate::storage::{MemoryStore, TokenStore};
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::oneshot;

    const UNREACHABLE: &str = "http://127.0.0.1:9";

    struct Mounted {
        console: Console<Vec<u8>>,
        session: Arc<SessionContext>,
        history: Arc<History>,
        store: Arc<MemoryStore>,
    }

    fn mount(start: &str, base_url: &str) -> Mounted {
        let store = Arc::new(MemoryStore::new());
        let expiry = ExpiryBroadcast::new();
        let history = Arc::new(History::new(start));
        let session = Arc::new(SessionContext::new(
            store.clone(),
            expiry.clone(),
            history.clone(),
            "/login",
        ));
        let settings = ApiSettings {
            base_url: base_url.to_string(),
            timeout_ms: 2_000,
        };
        let api = ApiClient::new(&settings, store.clone(), expiry).unwrap();
        let console = Console::new(
            session.clone(),
            api,
            history.clone(),
            RouteGuard::new(RouteSettings::default()),
            Vec::new(),
        );
        Mounted {
            console,
            session,
            history,
            store,
        }
    }

    fn payload() -> SessionPayload {
        let access_token = encode(
            &Header::default(),
            &serde_json::json!({ "exp": Utc::now().timestamp() + 3600 }),
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap();
        SessionPayload {
            access_token,
            refresh_token: "r-1".to_string(),
            admin: Admin {
                id: "42".to_string(),
                name: "Ana Ruiz".to_string(),
                email: "ana@club.org".to_string(),
                role: None,
            },
        }
    }

    fn text(console: &Console<Vec<u8>>) -> String {
        String::from_utf8(console.output().clone()).unwrap()
    }

    /// Serves one request; the session handed over logs out before the
    /// response is written.
    async fn logout_mid_request() -> (String, oneshot::Sender<Arc<SessionContext>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (hand_over, session) = oneshot::channel::<Arc<SessionContext>>();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();

            session.await.unwrap().logout();

            let body = r#"[{"name":"Carla Diaz"}]"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        (format!("http://{}", addr), hand_over)
    }

    #[tokio::test]
    async fn test_render_waits_for_initialization() {
        let mut mounted = mount("/players", UNREACHABLE);
        mounted.console.render().await.unwrap();
        assert!(text(&mounted.console).contains("Checking session..."));
        assert_eq!(mounted.history.current(), "/players");
    }

    #[tokio::test]
    async fn test_logged_out_visit_redirects_to_login() {
        let mut mounted = mount("/players", UNREACHABLE);
        mounted.session.initialize();

        mounted.console.run(&b"status\n"[..]).await.unwrap();

        let output = text(&mounted.console);
        assert!(output.contains("Redirecting to /login"));
        assert!(output.contains("Sign in: login <email> <password>"));
        assert!(output.contains("route: /login  session: signed out"));
        assert_eq!(mounted.history.visited(), vec!["/players", "/login"]);
    }

    #[tokio::test]
    async fn test_invalid_login_form_never_reaches_backend() {
        let mut mounted = mount("/login", UNREACHABLE);
        mounted.session.initialize();

        mounted
            .console
            .run(&b"login not-an-email secret\nquit\n"[..])
            .await
            .unwrap();

        let output = text(&mounted.console);
        assert!(output.contains("email has invalid format"));
        assert!(!output.contains("Signing in..."));
    }

    #[tokio::test]
    async fn test_unknown_command_is_reported() {
        let mut mounted = mount("/unauthorized", UNREACHABLE);
        mounted.session.initialize();

        mounted.console.run(&b"dance\n"[..]).await.unwrap();

        let output = text(&mounted.console);
        assert!(output.contains("You do not have access to this page."));
        assert!(output.contains("unknown command 'dance'"));
    }

    #[tokio::test]
    async fn test_expiry_mid_session_redirects_to_login() {
        let mut mounted = mount("/players", UNREACHABLE);
        mounted.session.initialize();
        mounted.session.login(payload()).unwrap();

        let (mut input, reader) = tokio::io::duplex(64);
        let expiry = mounted.session.expiry().clone();
        let (result, _) = tokio::join!(mounted.console.run(BufReader::new(reader)), async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            expiry.emit();
            tokio::time::sleep(Duration::from_millis(50)).await;
            input.write_all(b"status\n").await.unwrap();
        });
        result.unwrap();

        let output = text(&mounted.console);
        assert!(output.contains("Your session has expired."));
        assert!(output.contains("Redirecting to /login"));
        assert!(output.contains("route: /login  session: signed out"));
        assert_eq!(mounted.history.visited(), vec!["/players", "/login"]);
        assert!(mounted.store.read().is_empty());
    }

    #[tokio::test]
    async fn test_collection_arriving_after_logout_is_discarded() {
        let (base_url, hand_over) = logout_mid_request().await;
        let mut mounted = mount("/players", &base_url);
        mounted.session.initialize();
        mounted.session.login(payload()).unwrap();
        let _ = hand_over.send(mounted.session.clone());

        mounted.console.render().await.unwrap();

        let output = text(&mounted.console);
        assert!(output.contains("Loading players..."));
        assert!(!output.contains("Players (1)"));
        assert!(!output.contains("Carla Diaz"));
        assert!(!mounted.session.is_authenticated());
        assert_eq!(mounted.history.current(), "/login");
    }

    #[tokio::test]
    async fn test_session_lost_from_store_is_revalidated() {
        let mut mounted = mount("/players", UNREACHABLE);
        mounted.session.initialize();
        mounted.session.login(payload()).unwrap();
        // Cleared behind the context's back, without a listener running.
        mounted.store.clear().unwrap();

        mounted.console.render().await.unwrap();

        let output = text(&mounted.console);
        assert!(!output.contains("Could not load"));
        assert!(!mounted.session.is_authenticated());

        mounted.console.render().await.unwrap();
        assert!(text(&mounted.console).contains("Redirecting to /login"));
    }
}
