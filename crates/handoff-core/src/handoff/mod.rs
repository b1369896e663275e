//! Cross-application handoff protocol.
//!
//! When the user switches applications, the source app writes a one-time
//! transfer token to session storage and navigates to the destination with
//! `#switcher=<value>` in the fragment. The destination's bootstrap checks the
//! fragment against storage before deciding how to log the user in.
//!
//! A token is only good for the *other* application, only for 30 seconds,
//! and only if the fragment value matches storage exactly. It never stands
//! in for a credential.

pub mod fragment;
pub mod issuer;
pub mod store;
pub mod validator;

use thiserror::Error;
use tracing::{error, info};
use url::Url;

pub use fragment::HandoffMarker;
pub use store::TransferTokenStore;
pub use validator::TransferCheck;

use crate::browser::{AuthUi, Navigator};
use crate::clock::Clock;
use crate::models::{AppId, TransferToken};
use crate::storage::{Storage, StorageError};

/// How long a transfer token stays valid after issuance.
pub const DEFAULT_TRANSFER_TTL_MS: i64 = 30_000;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("Failed to store transfer token: {0}")]
    Storage(#[from] StorageError),

    #[error("Transfer token was not persisted")]
    NotPersisted,

    #[error("Invalid destination URL: {0}")]
    InvalidDestination(String),
}

/// The handoff protocol as seen from one application.
///
/// Tokens issued here carry `app` as their source; tokens validated here
/// must come from `app.peer()`.
#[derive(Debug)]
pub struct Handoff<S, C> {
    app: AppId,
    store: TransferTokenStore<S>,
    clock: C,
    ttl_ms: i64,
}

impl<S: Storage, C: Clock> Handoff<S, C> {
    pub fn new(app: AppId, storage: S, clock: C) -> Self {
        Self {
            app,
            store: TransferTokenStore::new(storage),
            clock,
            ttl_ms: DEFAULT_TRANSFER_TTL_MS,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn app(&self) -> AppId {
        self.app
    }

    pub fn peer(&self) -> AppId {
        self.app.peer()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn store(&self) -> &TransferTokenStore<S> {
        &self.store
    }

    pub fn issue(&self) -> Result<TransferToken, HandoffError> {
        issuer::issue(&self.store, &self.clock, self.app)
    }

    /// Issue a token and build the destination URL that carries it.
    pub fn switch_url(&self, destination: &str) -> Result<(TransferToken, Url), HandoffError> {
        // Parse first so a bad destination doesn't leave a stray token behind
        Url::parse(destination)
            .map_err(|e| HandoffError::InvalidDestination(format!("{}: {}", destination, e)))?;
        let token = self.issue()?;
        let url = issuer::switch_url(destination, &token)?;
        Ok((token, url))
    }

    /// Issue a token and navigate to `destination`.
    ///
    /// On failure nothing navigates: the user stays on the page and sees
    /// why the switch did not happen.
    pub fn switch<N: Navigator, U: AuthUi>(
        &self,
        destination: &str,
        navigator: &N,
        ui: &mut U,
    ) -> Result<TransferToken, HandoffError> {
        match self.switch_url(destination) {
            Ok((token, url)) => {
                info!(from = %self.app, to = %self.peer(), "Switching application");
                navigator.navigate(url.as_str());
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "Application switch aborted");
                ui.show_message(&format!("Could not switch application: {}", e));
                Err(e)
            }
        }
    }

    /// Switch through the gateway login page instead of a token; the
    /// gateway sends the user on to `return_path`.
    pub fn switch_via_login<N: Navigator>(
        &self,
        login_url: &str,
        return_path: &str,
        navigator: &N,
    ) -> Result<Url, HandoffError> {
        let url = issuer::login_redirect_url(login_url, return_path)?;
        info!(from = %self.app, return_path, "Switching application via gateway login");
        navigator.navigate(url.as_str());
        Ok(url)
    }

    /// Check `fragment` against storage, expecting a token from the peer.
    pub fn check(&self, fragment: &str) -> TransferCheck {
        self.check_from(fragment, self.peer())
    }

    pub fn check_from(&self, fragment: &str, expected_source: AppId) -> TransferCheck {
        validator::check(&self.store, &self.clock, fragment, expected_source, self.ttl_ms)
    }

    pub fn validate(&self, fragment: &str, expected_source: AppId) -> bool {
        self.check_from(fragment, expected_source).is_valid()
    }

    /// Remove the stored token so it cannot be replayed.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.clear()
    }
}
