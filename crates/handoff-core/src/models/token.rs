use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppId;

/// A one-time handoff value written by the issuing application.
///
/// The value is the random identifier joined to the issuance time, so two
/// tokens never collide even if the random source repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferToken {
    pub value: String,
    pub source_app: AppId,
    pub issued_at: DateTime<Utc>,
}

impl TransferToken {
    pub fn new(id: Uuid, source_app: AppId, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: format!("{}-{}", id.hyphenated(), issued_at.timestamp_millis()),
            source_app,
            issued_at,
        }
    }

    /// Milliseconds elapsed between issuance and `now`.
    /// Negative when the issuer's clock ran ahead of ours.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.issued_at.timestamp_millis()
    }

    /// Tokens are usable up to and including `ttl_ms` after issuance.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl_ms: i64) -> bool {
        self.age_ms(now) > ttl_ms
    }
}

/// Access/refresh material returned by either backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, when the backend reports it
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Cached user profile as returned by a userinfo / "who am I" endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(pub serde_json::Value);

impl UserInfo {
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(|v| v.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.0
            .get("preferred_username")
            .or_else(|| self.0.get("username"))
            .and_then(|v| v.as_str())
    }
}
