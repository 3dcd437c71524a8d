use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::configuration::ApiSettings;
use crate::error::{ApiError, AppError, AuthError};
use crate::session::{ExpiryBroadcast, SessionPayload};
use crate::storage::{StorageKey, TokenStore};

/// Login form body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Backend collections listed by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Tournaments,
    Clubs,
    Players,
    Umpires,
    Categories,
    Rankings,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Tournaments,
        Resource::Clubs,
        Resource::Players,
        Resource::Umpires,
        Resource::Categories,
        Resource::Rankings,
    ];

    /// Backend path segment, also the console route without the slash.
    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Tournaments => "tournaments",
            Resource::Clubs => "clubs",
            Resource::Players => "players",
            Resource::Umpires => "umpires",
            Resource::Categories => "categories",
            Resource::Rankings => "rankings",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resource::Tournaments => "Tournaments",
            Resource::Clubs => "Clubs",
            Resource::Players => "Players",
            Resource::Umpires => "Umpires",
            Resource::Categories => "Categories",
            Resource::Rankings => "Rankings",
        }
    }

    pub fn from_route(path: &str) -> Option<Self> {
        let segment = path.trim_start_matches('/');
        Self::ALL.into_iter().find(|r| r.segment() == segment)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionBody {
    List(Vec<serde_json::Value>),
    Wrapped { data: Vec<serde_json::Value> },
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Client for the administration REST backend.
///
/// Data requests read the bearer token straight from the token store, like a
/// request interceptor would, and fire the expiry broadcast when the backend
/// answers 401.
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    expiry: ExpiryBroadcast,
}

impl ApiClient {
    pub fn new(
        settings: &ApiSettings,
        store: Arc<dyn TokenStore>,
        expiry: ExpiryBroadcast,
    ) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            store,
            expiry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /auth/login
    ///
    /// # Errors
    /// - `AuthError::LoginRejected` with the backend's message on a 4xx
    /// - `ApiError::Status` on a 5xx
    /// - `ApiError::Network` / `ApiError::InvalidResponse` otherwise
    pub async fn login(&self, request: &LoginRequest) -> Result<SessionPayload, AppError> {
        let url = format!("{}/auth/login", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Login request failed: {}", e);
                ApiError::from(e)
            })?;

        let status = response.status();
        if status.is_client_error() {
            let message = error_message(response, "Invalid email or password").await;
            tracing::warn!(status = status.as_u16(), "Login rejected by backend");
            return Err(AuthError::LoginRejected(message).into());
        }
        if !status.is_success() {
            let message = error_message(response, "Login failed").await;
            return Err(ApiError::Status(status.as_u16(), message).into());
        }

        response
            .json::<SessionPayload>()
            .await
            .map_err(|e| AppError::Api(ApiError::InvalidResponse(e.to_string())))
    }

    /// GET /{resource}
    ///
    /// Accepts either a bare JSON array or `{"data": [...]}`.
    pub async fn fetch_collection(
        &self,
        resource: Resource,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let token = self
            .store
            .get(StorageKey::AccessToken)?
            .ok_or(AuthError::NotAuthenticated)?;
        let url = format!("{}/{}", self.base_url, resource.segment());

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!(resource = resource.segment(), "Backend rejected access token");
            self.expiry.emit();
            return Err(AuthError::TokenExpired.into());
        }
        if !status.is_success() {
            let message = error_message(response, "Request failed").await;
            return Err(ApiError::Status(status.as_u16(), message).into());
        }

        let body = response
            .json::<CollectionBody>()
            .await
            .map_err(|e| AppError::Api(ApiError::InvalidResponse(e.to_string())))?;

        Ok(match body {
            CollectionBody::List(items) => items,
            CollectionBody::Wrapped { data } => data,
        })
    }
}

async fn error_message(response: reqwest::Response, fallback: &str) -> String {
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    body.message
        .or(body.error)
        .unwrap_or_else(|| fallback.to_string())
}
