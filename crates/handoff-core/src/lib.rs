//! Core library for handoff.
//!
//! Lets a user move between two independently secured applications without
//! re-entering credentials. Each application keeps its own authentication
//! mechanism; the only thing that crosses the boundary is a short-lived,
//! one-time transfer token carried in the URL fragment.
//!
//! - `handoff`: transfer token issuing, storage and validation
//! - `auth`: credentials, the bootstrap state machine and UI action wiring
//! - `monitor`: keeps an established session alive
//! - `api`: HTTP clients for the cookie gateway and the identity provider
//! - `storage`: session-scoped and persistent key/value backends

pub mod api;
pub mod auth;
pub mod browser;
pub mod clock;
pub mod config;
pub mod handoff;
pub mod models;
pub mod monitor;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthSession, Bootstrap, BootstrapState, SessionStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, HandoffPolicy};
pub use handoff::{Handoff, HandoffError, TransferCheck};
pub use models::{AppId, TokenPair, TransferToken, UserInfo};
pub use storage::{Storage, StorageError};
