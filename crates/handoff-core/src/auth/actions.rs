use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthError, AuthMechanism, AuthSession};
use crate::api::{ApiResponse, GatewayClient};
use crate::browser::AuthUi;
use crate::models::UserInfo;

/// User-triggered actions on an application page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Action {
    Login,
    Logout,
    UserInfo,
    CallApi,
    Switch,
}

/// Actions that need an established session.
pub const AUTHENTICATED_ACTIONS: [Action; 4] =
    [Action::Logout, Action::UserInfo, Action::CallApi, Action::Switch];

/// Tracks which actions already have a handler attached, so wiring can be
/// re-run without duplicating handlers.
#[derive(Debug, Default, Clone)]
pub struct ActionBindings {
    bound: BTreeSet<Action>,
}

impl ActionBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `action` unless already attached. Returns whether a handler
    /// was attached by this call.
    pub fn bind<U: AuthUi + ?Sized>(&mut self, action: Action, ui: &mut U) -> bool {
        if !self.bound.insert(action) {
            return false;
        }
        ui.attach_action(action);
        debug!(?action, "Action handler attached");
        true
    }

    /// Attach every authenticated-only action not yet attached.
    pub fn wire_authenticated<U: AuthUi + ?Sized>(&mut self, ui: &mut U) -> usize {
        let mut attached = 0;
        for action in AUTHENTICATED_ACTIONS {
            if self.bind(action, ui) {
                attached += 1;
            }
        }
        attached
    }

    pub fn is_bound(&self, action: Action) -> bool {
        self.bound.contains(&action)
    }

    pub fn bound(&self) -> impl Iterator<Item = Action> + '_ {
        self.bound.iter().copied()
    }
}

/// `UserInfo` action. The profile is fetched on first use and kept on the
/// session until it is invalidated.
pub async fn user_info<'s, M: AuthMechanism>(
    session: &'s mut AuthSession,
    mechanism: &M,
) -> Result<&'s UserInfo, AuthError> {
    let token = session.bearer()?.to_string();
    if session.user_info().is_none() {
        let info = mechanism.fetch_user_info(&token).await?;
        debug!(user = ?info.username(), "Fetched user profile");
        session.set_user_info(info);
    }
    session.user_info().ok_or(AuthError::NotAuthenticated)
}

/// `CallApi` action: a bearer call through the gateway.
pub async fn call_api(
    session: &AuthSession,
    client: &GatewayClient,
    path: &str,
) -> Result<ApiResponse, AuthError> {
    let token = session.bearer()?;
    Ok(client.call_api(path, token).await?)
}
