use std::sync::Arc;

use admin_console::api_client::ApiClient;
use admin_console::configuration::{get_configuration, StorageBackend, TelemetrySettings};
use admin_console::console::Console;
use admin_console::guard::RouteGuard;
use admin_console::navigation::History;
use admin_console::session::{ExpiryBroadcast, SessionContext};
use admin_console::storage::{FileStore, MemoryStore, TokenStore};
use admin_console::telemetry::init_telemetry;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load settings first: they choose the log format.
    let configuration = match get_configuration() {
        Ok(config) => {
            init_telemetry(&config.telemetry);
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            init_telemetry(&TelemetrySettings::default());
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let store: Arc<dyn TokenStore> = match configuration.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => {
            tracing::info!(path = %configuration.storage.path.display(), "Using file token store");
            let store = FileStore::new(configuration.storage.path.clone());
            // Without the watcher, other consoles' logins and logouts go unnoticed.
            if let Err(e) = store.watch() {
                tracing::warn!(error = %e, "Token store file is not watched");
            }
            Arc::new(store)
        }
    };

    let expiry = ExpiryBroadcast::new();
    let history = Arc::new(History::new(configuration.routes.home.clone()));
    let session = Arc::new(SessionContext::new(
        store.clone(),
        expiry.clone(),
        history.clone(),
        configuration.routes.login.clone(),
    ));
    let _listeners = session.spawn_listeners();
    session.initialize();

    let api = ApiClient::new(&configuration.api, store, expiry).map_err(|e| {
        tracing::error!("Failed to build API client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "API client error")
    })?;
    tracing::info!(base_url = api.base_url(), "Console ready");

    let mut console = Console::new(
        session,
        api,
        history,
        RouteGuard::new(configuration.routes.clone()),
        std::io::stdout(),
    );

    console
        .run(BufReader::new(tokio::io::stdin()))
        .await
        .map_err(|e| {
            tracing::error!("Console stopped: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;

    tracing::info!("Console closed");
    Ok(())
}
