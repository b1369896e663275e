//! Authentication for one application.
//!
//! This module provides:
//! - `Credential` / `CredentialCache`: bearer material and its persistent cache
//! - `AuthSession`: the app's local view of its session
//! - `AuthMechanism`: the seam each app's login technology plugs into
//! - `Bootstrap`: the per-page-load state machine
//! - `ActionBindings`: idempotent wiring of authenticated-only actions

pub mod actions;
pub mod bootstrap;
pub mod credential;
pub mod error;
pub mod mechanism;
pub mod session;

pub use actions::{call_api, user_info, Action, ActionBindings, AUTHENTICATED_ACTIONS};
pub use bootstrap::{Bootstrap, BootstrapState};
pub use credential::{Credential, CredentialCache, ExpiryStatus};
pub use error::AuthError;
pub use mechanism::AuthMechanism;
pub use session::{AuthSession, SessionStatus};
