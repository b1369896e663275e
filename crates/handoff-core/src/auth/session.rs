use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthError, Credential};
use crate::models::UserInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionStatus {
    Unknown,
    Checking,
    Authenticated,
    Unauthenticated,
}

/// One application's local view of its own authentication.
#[derive(Debug, Clone)]
pub struct AuthSession {
    status: SessionStatus,
    credential: Option<Credential>,
    user_info: Option<UserInfo>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Unknown,
            credential: None,
            user_info: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated && self.credential.is_some()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn begin_check(&mut self) {
        self.status = SessionStatus::Checking;
    }

    pub fn authenticate(&mut self, credential: Credential) {
        self.status = SessionStatus::Authenticated;
        self.credential = Some(credential);
    }

    /// Replace the credential after a renewal, keeping the cached profile.
    pub fn update_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    /// Drop credential and profile.
    pub fn invalidate(&mut self) {
        debug!(previous = ?self.status, "Session invalidated");
        self.status = SessionStatus::Unauthenticated;
        self.credential = None;
        self.user_info = None;
    }

    /// Bearer token for authenticated-only actions.
    pub fn bearer(&self) -> Result<&str, AuthError> {
        match (&self.status, &self.credential) {
            (SessionStatus::Authenticated, Some(c)) => Ok(c.access_token.as_str()),
            _ => Err(AuthError::NotAuthenticated),
        }
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    pub fn set_user_info(&mut self, info: UserInfo) {
        self.user_info = Some(info);
    }
}
