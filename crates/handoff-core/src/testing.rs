//! Test doubles shared by unit tests across modules.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use crate::api::ApiError;
use crate::auth::{Action, AuthError, AuthMechanism, Credential};
use crate::browser::{AuthUi, Navigator};
use crate::models::UserInfo;
use crate::storage::{Storage, StorageError};

/// Every operation fails.
pub(crate) struct BrokenStorage;

impl Storage for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disabled".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disabled".to_string()))
    }
}

/// Accepts writes and forgets them.
pub(crate) struct DroppingStorage;

impl Storage for DroppingStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.visited.lock().unwrap().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.visited.lock().unwrap().push(url.to_string());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UiEvent {
    ShowLoading,
    HideLoading,
    Authenticated,
    Unauthenticated,
    Message(String),
    Attach(Action),
}

#[derive(Default)]
pub(crate) struct RecordingUi {
    pub events: Vec<UiEvent>,
    pub loading: bool,
}

impl RecordingUi {
    pub fn attached_count(&self, action: Action) -> usize {
        self.count(&UiEvent::Attach(action))
    }

    pub fn count(&self, event: &UiEvent) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    pub fn saw(&self, event: &UiEvent) -> bool {
        self.count(event) > 0
    }

    pub fn messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Message(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl AuthUi for RecordingUi {
    fn show_loading(&mut self) {
        self.loading = true;
        self.events.push(UiEvent::ShowLoading);
    }

    fn hide_loading(&mut self) {
        self.loading = false;
        self.events.push(UiEvent::HideLoading);
    }

    fn show_authenticated(&mut self) {
        self.events.push(UiEvent::Authenticated);
    }

    fn show_unauthenticated(&mut self) {
        self.events.push(UiEvent::Unauthenticated);
    }

    fn show_message(&mut self, message: &str) {
        self.events.push(UiEvent::Message(message.to_string()));
    }

    fn attach_action(&mut self, action: Action) {
        self.events.push(UiEvent::Attach(action));
    }
}

pub(crate) fn credential_expiring_at(millis: i64) -> Credential {
    Credential {
        access_token: format!("access-{}", millis),
        refresh_token: Some("refresh".to_string()),
        expires_at: Utc.timestamp_millis_opt(millis).unwrap(),
    }
}

/// Stand-in for a dropped connection; `reqwest::Error` cannot be built
/// outside reqwest.
pub(crate) fn network_failure() -> AuthError {
    AuthError::Api(ApiError::ServerError("connection reset by peer".to_string()))
}

/// Mechanism whose answers are queued up front.
#[derive(Default)]
pub(crate) struct ScriptedMechanism {
    pub cached: Option<Credential>,
    pub cached_fails: bool,
    /// Popped per `silent_renew`; `Ok(None)` once empty
    pub renewals: VecDeque<Result<Option<Credential>, AuthError>>,
    pub login_fails: bool,
    pub renew_calls: usize,
    pub login_calls: usize,
    pub sign_out_calls: usize,
    pub clear_calls: usize,
    pub profile: Option<UserInfo>,
    pub profile_calls: Cell<usize>,
}

impl ScriptedMechanism {
    pub fn with_cached(credential: Credential) -> Self {
        Self {
            cached: Some(credential),
            ..Default::default()
        }
    }
}

impl AuthMechanism for ScriptedMechanism {
    fn cached_session(&self) -> Result<Option<Credential>, AuthError> {
        if self.cached_fails {
            return Err(AuthError::Storage(StorageError::Unavailable(
                "disabled".to_string(),
            )));
        }
        Ok(self.cached.clone())
    }

    async fn silent_renew(&mut self) -> Result<Option<Credential>, AuthError> {
        self.renew_calls += 1;
        self.renewals.pop_front().unwrap_or(Ok(None))
    }

    async fn interactive_login(&mut self) -> Result<(), AuthError> {
        self.login_calls += 1;
        if self.login_fails {
            return Err(network_failure());
        }
        Ok(())
    }

    async fn sign_out(&mut self) -> Result<(), AuthError> {
        self.sign_out_calls += 1;
        self.cached = None;
        Ok(())
    }

    fn clear_local(&mut self) -> Result<(), AuthError> {
        self.clear_calls += 1;
        self.cached = None;
        Ok(())
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<UserInfo, AuthError> {
        self.profile_calls.set(self.profile_calls.get() + 1);
        self.profile.clone().ok_or(AuthError::Api(ApiError::Unauthorized))
    }
}
