use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{MonitorError, MIN_PERIOD};
use crate::api::ApiError;
use crate::auth::{Credential, CredentialCache};
use crate::clock::Clock;
use crate::models::TokenPair;
use crate::storage::Storage;

/// How often the gateway session is re-checked.
/// The gateway's access tokens outlive this comfortably, so one missed
/// check never costs the session.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// The cookie-backed refresh call.
#[allow(async_fn_in_trait)]
pub trait RefreshEndpoint {
    async fn refresh(&self) -> Result<TokenPair, ApiError>;
}

impl<R: RefreshEndpoint> RefreshEndpoint for &R {
    async fn refresh(&self) -> Result<TokenPair, ApiError> {
        (**self).refresh().await
    }
}

/// Why the polling loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// Navigation away, or the owner dropped the shutdown sender
    Cancelled,
    /// The gateway refused to refresh; credentials were cleared
    SessionLost,
}

/// Periodic session check for the cookie gateway app.
pub struct PollingMonitor<R, S, C> {
    endpoint: R,
    cache: CredentialCache<S>,
    clock: C,
    period: Duration,
    started: bool,
    refreshes: u64,
}

impl<R: RefreshEndpoint, S: Storage, C: Clock> PollingMonitor<R, S, C> {
    pub fn new(endpoint: R, cache: CredentialCache<S>, clock: C) -> Self {
        Self {
            endpoint,
            cache,
            clock,
            period: DEFAULT_POLL_INTERVAL,
            started: false,
            refreshes: 0,
        }
    }

    /// Periods below one second are raised to one second.
    pub fn with_period(mut self, period: Duration) -> Self {
        if period < MIN_PERIOD {
            warn!(period_ms = period.as_millis() as u64, "Poll period too short, using minimum");
        }
        self.period = period.max(MIN_PERIOD);
        self
    }

    /// Successful refreshes so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// Poll until cancelled or the session is lost. May only be started
    /// once per monitor.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<PollExit, MonitorError> {
        if self.started {
            return Err(MonitorError::AlreadyStarted);
        }
        self.started = true;

        // First check one full period after authentication, not immediately
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = self.period.as_secs(), "Session polling started");

        loop {
            if *shutdown.borrow() {
                debug!("Session polling cancelled");
                return Ok(PollExit::Cancelled);
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, stopping session polling");
                        return Ok(PollExit::Cancelled);
                    }
                }
                _ = ticker.tick() => {
                    if let Some(exit) = self.poll_once().await {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self) -> Option<PollExit> {
        match self.endpoint.refresh().await {
            Ok(pair) => {
                let credential = Credential::from_pair(&pair, self.clock.now());
                if let Err(e) = self.cache.store(&credential) {
                    warn!(error = %e, "Failed to cache refreshed credential");
                }
                self.refreshes += 1;
                debug!(refreshes = self.refreshes, "Session refreshed");
                None
            }
            Err(e) if e.is_transport() => {
                // No answer says nothing about the session; try again next tick
                warn!(error = %e, "Session refresh unreachable");
                None
            }
            Err(e) => {
                warn!(error = %e, "Not authenticated, stopping session polling");
                if let Err(e) = self.cache.clear() {
                    warn!(error = %e, "Failed to clear cached credential");
                }
                Some(PollExit::SessionLost)
            }
        }
    }
}
