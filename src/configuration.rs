use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub storage: StorageSettings,
    pub routes: RouteSettings,
    pub telemetry: TelemetrySettings,
}

/// REST backend settings
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
}

/// Token store settings
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("admin_session.json"),
        }
    }
}

/// Navigation targets used by the route guard
#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RouteSettings {
    pub login: String,
    pub home: String,
    pub unauthorized: String,
    /// Routes that render without a session. `login` and `unauthorized`
    /// are always treated as public even when missing here.
    pub public: Vec<String>,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            home: "/".to_string(),
            unauthorized: "/unauthorized".to_string(),
            public: vec!["/login".to_string(), "/unauthorized".to_string()],
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetrySettings {
    pub json_logs: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { json_logs: true }
    }
}

impl Settings {
    fn validate(self) -> Result<Self, ConfigError> {
        reqwest::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::InvalidValue(format!("api.base_url '{}': {}", self.api.base_url, e))
        })?;

        let routes = [
            ("routes.login", &self.routes.login),
            ("routes.home", &self.routes.home),
            ("routes.unauthorized", &self.routes.unauthorized),
        ];
        for (name, route) in routes {
            if !route.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must start with '/', got '{}'",
                    name, route
                )));
            }
        }

        Ok(self)
    }
}

/// Load settings from an optional `configuration` file (any format the
/// `config` crate understands) overridden by `APP_`-prefixed environment
/// variables, e.g. `APP_API__BASE_URL`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()?.validate()
}
