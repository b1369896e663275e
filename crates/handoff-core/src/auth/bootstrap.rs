//! Per-page-load authentication bootstrap.
//!
//! ```text
//! Init -> Checking -> Authenticated
//!                  -> Unauthenticated (redirecting to interactive login)
//!                  -> AwaitingInteractiveLogin
//! ```
//!
//! Recovery always finishes before any authenticated-only action is wired,
//! and every path ends with the loading indicator hidden unless the page is
//! navigating away.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{Action, ActionBindings, AuthError, AuthMechanism, AuthSession, Credential};
use crate::browser::AuthUi;
use crate::clock::Clock;
use crate::config::HandoffPolicy;
use crate::handoff::{Handoff, HandoffMarker, TransferCheck};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum BootstrapState {
    Init,
    Checking,
    Authenticated,
    Unauthenticated,
    AwaitingInteractiveLogin,
}

pub struct Bootstrap<S, C> {
    handoff: Handoff<S, C>,
    policy: HandoffPolicy,
    state: BootstrapState,
    session: AuthSession,
    actions: ActionBindings,
    login_redirected: bool,
    last_check: Option<TransferCheck>,
}

impl<S: Storage, C: Clock> Bootstrap<S, C> {
    pub fn new(handoff: Handoff<S, C>, policy: HandoffPolicy) -> Self {
        Self {
            handoff,
            policy,
            state: BootstrapState::Init,
            session: AuthSession::new(),
            actions: ActionBindings::new(),
            login_redirected: false,
            last_check: None,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AuthSession {
        &mut self.session
    }

    pub fn handoff(&self) -> &Handoff<S, C> {
        &self.handoff
    }

    pub fn actions(&self) -> &ActionBindings {
        &self.actions
    }

    /// Whether the run ended by navigating to the interactive login page.
    pub fn login_redirected(&self) -> bool {
        self.login_redirected
    }

    /// Validator outcome, when the fragment carried a handoff marker.
    pub fn last_check(&self) -> Option<&TransferCheck> {
        self.last_check.as_ref()
    }

    /// Run the bootstrap once for this page load. Never returns an error:
    /// every failure ends in a defined state.
    pub async fn run<M: AuthMechanism, U: AuthUi>(
        &mut self,
        fragment: &str,
        mechanism: &mut M,
        ui: &mut U,
    ) -> BootstrapState {
        if self.state != BootstrapState::Init {
            warn!(state = ?self.state, "Bootstrap already ran for this page load");
            return self.state;
        }

        self.transition(BootstrapState::Checking);
        self.session.begin_check();
        ui.show_loading();

        match self.recover(mechanism).await {
            Ok(Some(credential)) => self.on_authenticated(credential, ui),
            Ok(None) => self.on_unauthenticated(fragment, mechanism, ui).await,
            Err(e) => self.on_failure(&e, ui),
        }

        self.state
    }

    /// Attach authenticated-only action handlers. Safe to call repeatedly;
    /// does nothing before authentication.
    pub fn wire_authenticated_actions<U: AuthUi>(&mut self, ui: &mut U) -> usize {
        if self.state != BootstrapState::Authenticated {
            debug!(state = ?self.state, "Not wiring authenticated actions");
            return 0;
        }
        self.actions.wire_authenticated(ui)
    }

    async fn recover<M: AuthMechanism>(
        &self,
        mechanism: &mut M,
    ) -> Result<Option<Credential>, AuthError> {
        let now = self.handoff.clock().now();
        match mechanism.cached_session() {
            Ok(Some(credential)) if !credential.is_expired_at(now) => {
                debug!("Using cached session");
                return Ok(Some(credential));
            }
            Ok(Some(_)) => debug!("Cached session expired"),
            Ok(None) => debug!("No cached session"),
            // Unreadable cache is the same as no cache
            Err(e) => warn!(error = %e, "Failed to read cached session"),
        }

        debug!("Attempting silent renewal");
        mechanism.silent_renew().await
    }

    fn on_authenticated<U: AuthUi>(&mut self, credential: Credential, ui: &mut U) {
        // Burn the transfer token so the same fragment cannot be replayed
        if let Err(e) = self.handoff.clear() {
            warn!(error = %e, "Failed to clear transfer token");
        }

        self.session.authenticate(credential);
        self.transition(BootstrapState::Authenticated);
        info!(app = %self.handoff.app(), "Authenticated");

        ui.hide_loading();
        ui.show_authenticated();
        self.actions.wire_authenticated(ui);
    }

    async fn on_unauthenticated<M: AuthMechanism, U: AuthUi>(
        &mut self,
        fragment: &str,
        mechanism: &mut M,
        ui: &mut U,
    ) {
        self.session.invalidate();
        self.transition(BootstrapState::Unauthenticated);

        if !HandoffMarker::parse(fragment).is_present() {
            info!("Not authenticated, waiting for login");
            self.await_interactive_login(ui);
            return;
        }

        let check = self.handoff.check(fragment);
        ui.show_message(check.user_message());
        let proceed = match self.policy {
            HandoffPolicy::Advisory => true,
            HandoffPolicy::Enforced => check.is_valid(),
        };
        self.last_check = Some(check);

        if !proceed {
            info!("Handoff rejected, interactive login required");
            self.await_interactive_login(ui);
            return;
        }

        // Loading stays up: the page is about to navigate away
        info!("Handoff in progress, redirecting to login");
        match mechanism.interactive_login().await {
            Ok(()) => self.login_redirected = true,
            Err(e) => self.on_failure(&e, ui),
        }
    }

    fn await_interactive_login<U: AuthUi>(&mut self, ui: &mut U) {
        self.transition(BootstrapState::AwaitingInteractiveLogin);
        ui.hide_loading();
        ui.show_unauthenticated();
        self.actions.bind(Action::Login, ui);
    }

    fn on_failure<U: AuthUi>(&mut self, e: &AuthError, ui: &mut U) {
        error!(error = %e, "Authentication bootstrap failed");
        self.session.invalidate();
        self.transition(BootstrapState::Unauthenticated);

        ui.show_message(&format!("Authentication check failed: {}", e));
        ui.hide_loading();
        ui.show_unauthenticated();
        self.actions.bind(Action::Login, ui);
    }

    fn transition(&mut self, next: BootstrapState) {
        debug!(from = ?self.state, to = ?next, "Bootstrap transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SessionStatus, AUTHENTICATED_ACTIONS};
    use crate::clock::ManualClock;
    use crate::handoff::fragment::switcher_fragment;
    use crate::models::AppId;
    use crate::storage::MemoryStorage;
    use crate::testing::{
        credential_expiring_at, network_failure, RecordingUi, ScriptedMechanism, UiEvent,
    };

    struct Page<'a> {
        storage: &'a MemoryStorage,
        clock: &'a ManualClock,
    }

    impl<'a> Page<'a> {
        /// App B page sharing storage with an App A page
        fn bootstrap(&self, policy: HandoffPolicy) -> Bootstrap<&'a MemoryStorage, &'a ManualClock> {
            Bootstrap::new(Handoff::new(AppId::AppB, self.storage, self.clock), policy)
        }

        /// Fragment as produced by App A's switch button
        fn switch_from_a(&self) -> String {
            let token = Handoff::new(AppId::AppA, self.storage, self.clock)
                .issue()
                .unwrap();
            format!("#{}", switcher_fragment(&token.value))
        }
    }

    #[tokio::test]
    async fn test_cached_session_skips_renewal() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::with_cached(credential_expiring_at(60_000));
        let mut ui = RecordingUi::default();

        let state = bootstrap.run("", &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::Authenticated);
        assert_eq!(mechanism.renew_calls, 0);
        assert_eq!(bootstrap.session().status(), SessionStatus::Authenticated);
        assert!(!ui.loading);
        for action in AUTHENTICATED_ACTIONS {
            assert_eq!(ui.attached_count(action), 1);
        }
    }

    #[tokio::test]
    async fn test_expired_cache_falls_back_to_silent_renewal() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(120_000);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::with_cached(credential_expiring_at(60_000));
        mechanism.renewals.push_back(Ok(Some(credential_expiring_at(400_000))));
        let mut ui = RecordingUi::default();

        let state = bootstrap.run("", &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::Authenticated);
        assert_eq!(mechanism.renew_calls, 1);
        let expires = bootstrap.session().credential().unwrap().expires_at;
        assert_eq!(expires.timestamp_millis(), 400_000);
    }

    #[tokio::test]
    async fn test_success_clears_transfer_token() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let fragment = page.switch_from_a();
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::default();
        mechanism.renewals.push_back(Ok(Some(credential_expiring_at(60_000))));
        let mut ui = RecordingUi::default();

        assert!(bootstrap.handoff().check(&fragment).is_valid());
        bootstrap.run(&fragment, &mut mechanism, &mut ui).await;

        assert_eq!(bootstrap.state(), BootstrapState::Authenticated);
        assert!(storage.is_empty());
        assert_eq!(
            bootstrap.handoff().check(&fragment),
            TransferCheck::Missing(crate::handoff::store::TOKEN_KEY)
        );
    }

    #[tokio::test]
    async fn test_no_marker_no_session_awaits_login() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::default();
        let mut ui = RecordingUi::default();

        let state = bootstrap.run("", &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::AwaitingInteractiveLogin);
        assert!(!ui.loading);
        assert!(ui.saw(&UiEvent::Unauthenticated));
        assert_eq!(ui.attached_count(Action::Login), 1);
        assert_eq!(ui.attached_count(Action::CallApi), 0);
        assert_eq!(mechanism.login_calls, 0);
        assert!(!bootstrap.login_redirected());
    }

    #[tokio::test]
    async fn test_renewal_network_error_ends_unauthenticated() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::default();
        mechanism.renewals.push_back(Err(network_failure()));
        let mut ui = RecordingUi::default();

        let state = bootstrap.run("", &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::Unauthenticated);
        assert_eq!(bootstrap.session().status(), SessionStatus::Unauthenticated);
        assert!(!ui.loading);
        assert!(!ui.messages().is_empty());
        assert_eq!(ui.attached_count(Action::Login), 1);
        assert_eq!(ui.attached_count(Action::UserInfo), 0);
    }

    #[tokio::test]
    async fn test_unreadable_cache_still_renews() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism {
            cached_fails: true,
            ..Default::default()
        };
        mechanism.renewals.push_back(Ok(Some(credential_expiring_at(60_000))));
        let mut ui = RecordingUi::default();

        assert_eq!(
            bootstrap.run("", &mut mechanism, &mut ui).await,
            BootstrapState::Authenticated
        );
    }

    #[tokio::test]
    async fn test_advisory_invalid_handoff_still_redirects() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::default();
        let mut ui = RecordingUi::default();

        let state = bootstrap.run("#switcher=forged", &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::Unauthenticated);
        assert_eq!(mechanism.login_calls, 1);
        assert!(bootstrap.login_redirected());
        assert!(matches!(bootstrap.last_check(), Some(TransferCheck::Missing(_))));
        // Never flash the logged-out UI before leaving
        assert!(ui.loading);
        assert!(!ui.saw(&UiEvent::Unauthenticated));
    }

    #[tokio::test]
    async fn test_bare_marker_redirects() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::default();
        let mut ui = RecordingUi::default();

        bootstrap.run("#switcher", &mut mechanism, &mut ui).await;

        assert_eq!(mechanism.login_calls, 1);
        assert_eq!(bootstrap.last_check(), Some(&TransferCheck::NoToken));
    }

    #[tokio::test]
    async fn test_valid_handoff_redirects_and_keeps_token() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let fragment = page.switch_from_a();
        clock.set_millis(10_000);
        let mut bootstrap = page.bootstrap(HandoffPolicy::Enforced);
        let mut mechanism = ScriptedMechanism::default();
        let mut ui = RecordingUi::default();

        bootstrap.run(&fragment, &mut mechanism, &mut ui).await;

        assert_eq!(bootstrap.last_check(), Some(&TransferCheck::Valid));
        assert_eq!(mechanism.login_calls, 1);
        assert!(ui.loading);
        // Not burned until authentication succeeds
        assert!(!storage.is_empty());
    }

    #[tokio::test]
    async fn test_enforced_policy_blocks_expired_handoff() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let fragment = page.switch_from_a();
        clock.set_millis(31_000);
        let mut bootstrap = page.bootstrap(HandoffPolicy::Enforced);
        let mut mechanism = ScriptedMechanism::default();
        let mut ui = RecordingUi::default();

        let state = bootstrap.run(&fragment, &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::AwaitingInteractiveLogin);
        assert_eq!(mechanism.login_calls, 0);
        assert!(!ui.loading);
        assert!(matches!(bootstrap.last_check(), Some(TransferCheck::Expired { .. })));
        assert!(ui
            .messages()
            .iter()
            .any(|m| m.contains("expired")));
    }

    #[tokio::test]
    async fn test_login_redirect_failure_clears_loading() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism {
            login_fails: true,
            ..Default::default()
        };
        let mut ui = RecordingUi::default();

        let state = bootstrap.run("#switcher=x", &mut mechanism, &mut ui).await;

        assert_eq!(state, BootstrapState::Unauthenticated);
        assert!(!bootstrap.login_redirected());
        assert!(!ui.loading);
        assert!(ui.saw(&UiEvent::Unauthenticated));
    }

    #[tokio::test]
    async fn test_runs_once_per_page_load() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::default();
        mechanism.renewals.push_back(Ok(Some(credential_expiring_at(60_000))));
        let mut ui = RecordingUi::default();

        bootstrap.run("", &mut mechanism, &mut ui).await;
        bootstrap.run("", &mut mechanism, &mut ui).await;

        assert_eq!(mechanism.renew_calls, 1);
        assert_eq!(ui.count(&UiEvent::ShowLoading), 1);
    }

    #[tokio::test]
    async fn test_rewiring_after_authentication_is_idempotent() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut mechanism = ScriptedMechanism::with_cached(credential_expiring_at(60_000));
        let mut ui = RecordingUi::default();

        bootstrap.run("", &mut mechanism, &mut ui).await;
        assert_eq!(bootstrap.wire_authenticated_actions(&mut ui), 0);
        assert_eq!(bootstrap.wire_authenticated_actions(&mut ui), 0);

        for action in AUTHENTICATED_ACTIONS {
            assert_eq!(ui.attached_count(action), 1);
        }
    }

    #[tokio::test]
    async fn test_no_wiring_before_authentication() {
        let storage = MemoryStorage::new();
        let clock = ManualClock::at_millis(0);
        let page = Page { storage: &storage, clock: &clock };
        let mut bootstrap = page.bootstrap(HandoffPolicy::Advisory);
        let mut ui = RecordingUi::default();

        assert_eq!(bootstrap.wire_authenticated_actions(&mut ui), 0);
        assert!(ui.events.is_empty());
    }
}
