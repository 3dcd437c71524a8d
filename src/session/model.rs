use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The logged-in administrator's profile, as stored under the `admin` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    #[serde(alias = "_id", deserialize_with = "id_format::deserialize")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

// Backends hand out either string or numeric ids.
mod id_format {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    pub fn deserialize<'de, D>(deser: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawId::deserialize(deser)? {
            RawId::Text(id) => id,
            RawId::Number(id) => id.to_string(),
        })
    }
}

/// Successful login response body; also what gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub admin: Admin,
}

/// A session read back from storage and found usable.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub admin: Admin,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_accepts_numeric_id() {
        let admin: Admin =
            serde_json::from_str(r#"{"id": 7, "name": "Lee", "email": "lee@club.org"}"#).unwrap();
        assert_eq!(admin.id, "7");
        assert!(admin.role.is_none());
    }

    #[test]
    fn test_admin_accepts_underscore_id() {
        let admin: Admin = serde_json::from_str(
            r#"{"_id": "65f0c1", "name": "Lee", "email": "lee@club.org", "role": "editor"}"#,
        )
        .unwrap();
        assert_eq!(admin.id, "65f0c1");
        assert_eq!(admin.role.as_deref(), Some("editor"));
    }

    #[test]
    fn test_admin_missing_email_is_rejected() {
        let result = serde_json::from_str::<Admin>(r#"{"id": "1", "name": "Lee"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_login_payload_uses_camel_case() {
        let payload: SessionPayload = serde_json::from_str(
            r#"{
                "accessToken": "a.b.c",
                "refreshToken": "r",
                "admin": {"id": "1", "name": "Lee", "email": "lee@club.org"}
            }"#,
        )
        .unwrap();
        assert_eq!(payload.access_token, "a.b.c");
        assert_eq!(payload.refresh_token, "r");
    }
}
