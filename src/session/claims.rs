/// Access token claims
///
/// The console only needs the expiry. Tokens are decoded without signature
/// verification: the backend verifies signatures on every request, and the
/// client-side expiry check only decides when to show the login page.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims read from the access token payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenClaims {
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    /// Subject (admin id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Expired when `exp`, in milliseconds, is strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp.saturating_mul(1000) < now.timestamp_millis()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenDecodeError {
    /// Not three segments, bad base64, or a payload that is not JSON
    Malformed(String),
    /// Payload decoded but has no numeric `exp`
    MissingExpiry,
}

impl fmt::Display for TokenDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenDecodeError::Malformed(msg) => write!(f, "malformed token: {}", msg),
            TokenDecodeError::MissingExpiry => write!(f, "token has no exp claim"),
        }
    }
}

impl std::error::Error for TokenDecodeError {}

// Wire shape; `exp` is optional here so its absence is reported as such.
#[derive(Deserialize)]
struct RawClaims {
    exp: Option<i64>,
    // Some backends issue numeric subjects.
    #[serde(default)]
    sub: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
}

/// Decode the payload segment of an access token.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenDecodeError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    // Expiry is checked by the caller against its own clock, without leeway.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let raw = decode::<RawClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| TokenDecodeError::Malformed(e.to_string()))?
        .claims;

    let exp = raw.exp.ok_or(TokenDecodeError::MissingExpiry)?;
    Ok(TokenClaims {
        exp,
        sub: raw.sub.map(|sub| match sub {
            serde_json::Value::String(sub) => sub,
            other => other.to_string(),
        }),
        email: raw.email,
        role: raw.role,
        iat: raw.iat,
    })
}
