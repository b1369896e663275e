//! Keeping an established session alive.
//!
//! Two variants, matching the two authentication mechanisms:
//! - `EventMonitor`: reacts to expiry and sign-out events with silent
//!   renewal (identity-provider session)
//! - `PollingMonitor`: calls the refresh endpoint on a fixed interval and
//!   stops for good once the session is gone (cookie gateway)

pub mod events;
pub mod polling;

use std::time::Duration;

use thiserror::Error;

pub use events::{EventMonitor, LifecycleEvent, MonitorEvent, RenewalState, WatchExit};
pub use polling::{PollExit, PollingMonitor, RefreshEndpoint, DEFAULT_POLL_INTERVAL};

/// Shortest tick either monitor accepts; shorter periods are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor already started for this page load")]
    AlreadyStarted,
}
