use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::{AuthMechanism, AuthSession, ExpiryStatus};
use super::MIN_PERIOD;
use crate::clock::Clock;

/// What the identity provider session reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    TokenNearingExpiry,
    TokenExpired,
    RemoteSignOut,
}

/// Transitions emitted while handling a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Renewing,
    Renewed,
    RenewFailed,
    RemoteSignOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    Idle,
    Renewing,
}

/// Why `watch_expiry` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    Cancelled,
    SessionEnded,
}

/// Event-driven session keeper.
///
/// Renewals never overlap: an event arriving while a renewal is in flight
/// is dropped, and `state()` shows which is the case.
#[derive(Debug)]
pub struct EventMonitor {
    state: RenewalState,
    min_validity_secs: i64,
}

impl EventMonitor {
    pub fn new(min_validity_secs: i64) -> Self {
        Self {
            state: RenewalState::Idle,
            min_validity_secs,
        }
    }

    pub fn state(&self) -> RenewalState {
        self.state
    }

    /// Handle one event and return the transitions it produced, in order.
    pub async fn handle<M: AuthMechanism>(
        &mut self,
        event: LifecycleEvent,
        mechanism: &mut M,
        session: &mut AuthSession,
    ) -> Vec<MonitorEvent> {
        match event {
            LifecycleEvent::RemoteSignOut => {
                info!("Remote sign-out");
                if let Err(e) = mechanism.clear_local() {
                    warn!(error = %e, "Failed to clear local session");
                }
                session.invalidate();
                vec![MonitorEvent::RemoteSignOut]
            }
            LifecycleEvent::TokenNearingExpiry | LifecycleEvent::TokenExpired => {
                // Only reachable for hosts that dispatch events concurrently;
                // `watch_expiry` awaits each renewal before the next event
                if self.state == RenewalState::Renewing {
                    debug!(?event, "Renewal already in flight, dropping event");
                    return Vec::new();
                }
                self.renew(event, mechanism, session).await
            }
        }
    }

    async fn renew<M: AuthMechanism>(
        &mut self,
        event: LifecycleEvent,
        mechanism: &mut M,
        session: &mut AuthSession,
    ) -> Vec<MonitorEvent> {
        self.state = RenewalState::Renewing;
        let mut emitted = vec![MonitorEvent::Renewing];

        let outcome = mechanism.silent_renew().await;
        self.state = RenewalState::Idle;

        match outcome {
            Ok(Some(credential)) => {
                info!("Token refreshed");
                session.update_credential(credential);
                emitted.push(MonitorEvent::Renewed);
            }
            failed => {
                match failed {
                    Err(e) => warn!(?event, error = %e, "Token refresh failed"),
                    _ => warn!(?event, "Token refresh failed: no session"),
                }
                emitted.push(MonitorEvent::RenewFailed);
                // Nearing expiry stays optimistic until the token actually expires
                if event == LifecycleEvent::TokenExpired {
                    session.invalidate();
                }
            }
        }
        emitted
    }

    /// Translate the session's expiry into lifecycle events on every tick,
    /// and forward externally reported events (sign-out) as they arrive.
    ///
    /// Returns when the session ends, `shutdown` flips to `true` or its
    /// sender is dropped.
    pub async fn watch_expiry<M: AuthMechanism, C: Clock>(
        &mut self,
        mechanism: &mut M,
        session: &mut AuthSession,
        clock: &C,
        period: Duration,
        mut external: mpsc::Receiver<LifecycleEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> WatchExit {
        let mut ticker = interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut external_open = true;

        loop {
            if !session.is_authenticated() {
                return WatchExit::SessionEnded;
            }
            if *shutdown.borrow() {
                return WatchExit::Cancelled;
            }

            let event = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return WatchExit::Cancelled;
                    }
                    continue;
                }
                received = external.recv(), if external_open => match received {
                    Some(event) => Some(event),
                    None => {
                        external_open = false;
                        None
                    }
                },
                _ = ticker.tick() => {
                    let now = clock.now();
                    session
                        .credential()
                        .map(|c| c.expiry_status_at(now, self.min_validity_secs))
                        .and_then(|status| match status {
                            ExpiryStatus::Fresh => None,
                            ExpiryStatus::NearingExpiry => Some(LifecycleEvent::TokenNearingExpiry),
                            ExpiryStatus::Expired => Some(LifecycleEvent::TokenExpired),
                        })
                }
            };

            if let Some(event) = event {
                self.handle(event, mechanism, session).await;
            }
        }
    }
}
