//! Creating transfer tokens and the URLs that carry them.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::fragment::switcher_fragment;
use super::store::TransferTokenStore;
use super::HandoffError;
use crate::clock::Clock;
use crate::models::{AppId, TransferToken};
use crate::storage::Storage;

/// Query parameter the gateway login endpoint reads the return path from
const REDIRECT_PARAM: &str = "redirect";

/// Fresh token with 128 bits of OS randomness.
pub fn generate(source_app: AppId, now: DateTime<Utc>) -> TransferToken {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
    TransferToken::new(id, source_app, now)
}

/// Generate a token for `source_app` and persist it.
///
/// The write is read back before returning: a storage that silently drops
/// writes must not let the switch look successful.
pub fn issue<S: Storage, C: Clock>(
    store: &TransferTokenStore<S>,
    clock: &C,
    source_app: AppId,
) -> Result<TransferToken, HandoffError> {
    let token = generate(source_app, clock.now());
    store.set(&token)?;

    match store.get()? {
        Some(stored) if stored.value == token.value => {
            info!(source = %source_app, "Transfer token issued");
            debug!(issued_at = %token.issued_at, "Transfer token persisted");
            Ok(token)
        }
        _ => Err(HandoffError::NotPersisted),
    }
}

/// Destination entry URL with the token in its fragment.
pub fn switch_url(destination: &str, token: &TransferToken) -> Result<Url, HandoffError> {
    let mut url = Url::parse(destination)
        .map_err(|e| HandoffError::InvalidDestination(format!("{}: {}", destination, e)))?;
    url.set_fragment(Some(&switcher_fragment(&token.value)));
    Ok(url)
}

/// Gateway login URL that returns to `return_path` afterwards. Used for
/// switches that go through the gateway instead of carrying a token.
pub fn login_redirect_url(login_url: &str, return_path: &str) -> Result<Url, HandoffError> {
    let mut url = Url::parse(login_url)
        .map_err(|e| HandoffError::InvalidDestination(format!("{}: {}", login_url, e)))?;
    url.query_pairs_mut().append_pair(REDIRECT_PARAM, return_path);
    Ok(url)
}

/// Identifier part of a token value, for logs that must not carry the
/// whole value.
pub(crate) fn short_id(value: &str) -> &str {
    value.get(..8).unwrap_or(value)
}
