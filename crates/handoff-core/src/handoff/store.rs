use chrono::{TimeZone, Utc};
use tracing::warn;

use crate::models::{AppId, TransferToken};
use crate::storage::{Storage, StorageError};

/// Session storage key holding the token value
pub const TOKEN_KEY: &str = "app_transfer_token";

/// Session storage key holding the issuing application's identifier
pub const SOURCE_KEY: &str = "app_transfer_source";

/// Session storage key holding the issuance time in epoch milliseconds
pub const TIMESTAMP_KEY: &str = "app_transfer_timestamp";

/// Raw state of the three handoff keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredTransfer {
    Present(TransferToken),
    /// A key is absent
    Missing(&'static str),
    /// A key is present but does not parse
    Malformed(&'static str),
}

/// Typed access to the transfer token in session-scoped storage.
///
/// This is the only place that knows the storage keys; issuing, validating
/// and clearing all go through it.
#[derive(Debug, Clone)]
pub struct TransferTokenStore<S> {
    storage: S,
}

impl<S: Storage> TransferTokenStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read all three keys.
    pub fn load(&self) -> Result<StoredTransfer, StorageError> {
        let Some(value) = self.storage.get(TOKEN_KEY)? else {
            return Ok(StoredTransfer::Missing(TOKEN_KEY));
        };
        let Some(source) = self.storage.get(SOURCE_KEY)? else {
            return Ok(StoredTransfer::Missing(SOURCE_KEY));
        };
        let Some(timestamp) = self.storage.get(TIMESTAMP_KEY)? else {
            return Ok(StoredTransfer::Missing(TIMESTAMP_KEY));
        };

        let Some(source_app) = AppId::parse(&source) else {
            return Ok(StoredTransfer::Malformed(SOURCE_KEY));
        };
        let issued_at = match timestamp.trim().parse::<i64>() {
            Ok(millis) => Utc.timestamp_millis_opt(millis).single(),
            Err(_) => None,
        };
        let Some(issued_at) = issued_at else {
            return Ok(StoredTransfer::Malformed(TIMESTAMP_KEY));
        };

        Ok(StoredTransfer::Present(TransferToken {
            value,
            source_app,
            issued_at,
        }))
    }

    /// The stored token, if all three keys are present and well formed.
    pub fn get(&self) -> Result<Option<TransferToken>, StorageError> {
        match self.load()? {
            StoredTransfer::Present(token) => Ok(Some(token)),
            _ => Ok(None),
        }
    }

    pub fn set(&self, token: &TransferToken) -> Result<(), StorageError> {
        self.storage.set(TOKEN_KEY, &token.value)?;
        self.storage.set(SOURCE_KEY, token.source_app.as_str())?;
        self.storage
            .set(TIMESTAMP_KEY, &token.issued_at.timestamp_millis().to_string())?;
        Ok(())
    }

    /// Remove all three keys. Every key is attempted even if an earlier
    /// removal fails; the first error is returned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in [TOKEN_KEY, SOURCE_KEY, TIMESTAMP_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove transfer key");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
