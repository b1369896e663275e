use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, warn};

use crate::models::{AppId, TokenPair};
use crate::storage::{Storage, StorageError};

/// Access token lifetime assumed when the backend does not report one.
/// The gateway's refresh endpoint returns bare tokens; its access tokens
/// live for five minutes.
const DEFAULT_ACCESS_TOKEN_LIFETIME_SECS: i64 = 300;

/// Bearer material owned by one application. Never crosses to the peer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Where a credential stands relative to its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Fresh,
    NearingExpiry,
    Expired,
}

impl Credential {
    /// A negative or unrepresentable `expires_in` falls back to the default
    /// lifetime.
    pub fn from_pair(pair: &TokenPair, now: DateTime<Utc>) -> Self {
        let reported = pair
            .expires_in
            .filter(|secs| *secs >= 0)
            .and_then(|secs| offset(now, secs));
        let expires_at = match reported {
            Some(expires_at) => expires_at,
            None => {
                if pair.expires_in.is_some() {
                    warn!(expires_in = ?pair.expires_in, "Ignoring unusable token lifetime");
                }
                now + Duration::seconds(DEFAULT_ACCESS_TOKEN_LIFETIME_SECS)
            }
        };
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True once fewer than `min_validity_secs` remain.
    /// A window too large to represent always needs a refresh.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, min_validity_secs: i64) -> bool {
        match offset(now, min_validity_secs) {
            Some(deadline) => deadline > self.expires_at,
            None => true,
        }
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn expiry_status_at(&self, now: DateTime<Utc>, min_validity_secs: i64) -> ExpiryStatus {
        if self.is_expired_at(now) {
            ExpiryStatus::Expired
        } else if self.needs_refresh_at(now, min_validity_secs) {
            ExpiryStatus::NearingExpiry
        } else {
            ExpiryStatus::Fresh
        }
    }
}

/// `now` shifted by `secs`, or `None` past chrono's range.
fn offset(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Cached credential in persistent storage, under keys prefixed with the
/// owning application's identifier.
#[derive(Debug, Clone)]
pub struct CredentialCache<S> {
    storage: S,
    prefix: &'static str,
}

impl<S: Storage> CredentialCache<S> {
    pub fn new(storage: S, app: AppId) -> Self {
        Self {
            storage,
            prefix: app.as_str(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// `true` only if the authenticated flag is set; does not check expiry.
    pub fn is_authenticated(&self) -> Result<bool, StorageError> {
        Ok(self.storage.get(&self.key("is_authenticated"))?.as_deref() == Some("true"))
    }

    /// Load the cached credential. Expired credentials are returned as-is;
    /// callers decide what expiry means for them.
    pub fn load(&self) -> Result<Option<Credential>, StorageError> {
        if !self.is_authenticated()? {
            return Ok(None);
        }
        let Some(access_token) = self.storage.get(&self.key("access_token"))? else {
            return Ok(None);
        };
        let refresh_token = self.storage.get(&self.key("refresh_token"))?;
        let expires_at = self
            .storage
            .get(&self.key("access_expires_at"))?
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());

        let Some(expires_at) = expires_at else {
            debug!(prefix = self.prefix, "Cached credential has no usable expiry");
            return Ok(None);
        };

        Ok(Some(Credential {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Write a credential. A missing refresh token keeps the one already
    /// cached.
    pub fn store(&self, credential: &Credential) -> Result<(), StorageError> {
        self.storage
            .set(&self.key("access_token"), &credential.access_token)?;
        if let Some(ref refresh) = credential.refresh_token {
            self.storage.set(&self.key("refresh_token"), refresh)?;
        }
        self.storage.set(
            &self.key("access_expires_at"),
            &credential.expires_at.timestamp_millis().to_string(),
        )?;
        self.storage.set(&self.key("is_authenticated"), "true")?;
        Ok(())
    }

    /// Drop all token material and mark the app unauthenticated.
    /// Every key is attempted; the first failure is returned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let results = [
            self.storage.remove(&self.key("access_token")),
            self.storage.remove(&self.key("refresh_token")),
            self.storage.remove(&self.key("access_expires_at")),
            self.storage.set(&self.key("is_authenticated"), "false"),
        ];
        results.into_iter().collect()
    }
}
