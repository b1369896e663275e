//! Deciding whether an incoming switch request is legitimate.
//!
//! Validation is read-only: the token is cleared by the bootstrap only after
//! authentication actually succeeds, so a failed login attempt does not burn
//! it.

use std::fmt;

use tracing::{debug, warn};

use super::fragment::HandoffMarker;
use super::issuer::short_id;
use super::store::{StoredTransfer, TransferTokenStore};
use crate::clock::Clock;
use crate::models::AppId;
use crate::storage::Storage;

/// Outcome of checking a fragment against the stored transfer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCheck {
    Valid,
    /// No `switcher` marker in the fragment
    NoMarker,
    /// `#switcher` without a value
    NoToken,
    /// A storage key is absent
    Missing(&'static str),
    /// A storage key does not parse
    Malformed(&'static str),
    ValueMismatch,
    WrongSource { expected: AppId, found: AppId },
    Expired { age_ms: i64 },
    StorageUnavailable(String),
}

impl TransferCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, TransferCheck::Valid)
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            TransferCheck::Valid => "Valid transfer token detected - redirecting to login",
            TransferCheck::NoMarker => "No application switch in progress",
            TransferCheck::Expired { .. } => "Transfer token expired - login required",
            TransferCheck::WrongSource { .. } => "Invalid transfer source - login required",
            _ => "Invalid or missing transfer token - login required",
        }
    }
}

impl fmt::Display for TransferCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferCheck::Valid => write!(f, "valid"),
            TransferCheck::NoMarker => write!(f, "no handoff marker"),
            TransferCheck::NoToken => write!(f, "handoff marker without token"),
            TransferCheck::Missing(key) => write!(f, "missing {}", key),
            TransferCheck::Malformed(key) => write!(f, "malformed {}", key),
            TransferCheck::ValueMismatch => write!(f, "token mismatch"),
            TransferCheck::WrongSource { expected, found } => {
                write!(f, "source {} (expected {})", found, expected)
            }
            TransferCheck::Expired { age_ms } => write!(f, "expired ({} ms old)", age_ms),
            TransferCheck::StorageUnavailable(e) => write!(f, "storage unavailable: {}", e),
        }
    }
}

/// Run every rule in order and report the first that fails.
pub fn check<S: Storage, C: Clock>(
    store: &TransferTokenStore<S>,
    clock: &C,
    fragment: &str,
    expected_source: AppId,
    ttl_ms: i64,
) -> TransferCheck {
    let result = evaluate(store, clock, fragment, expected_source, ttl_ms);
    match &result {
        TransferCheck::Valid => debug!(expected = %expected_source, "Transfer token accepted"),
        TransferCheck::NoMarker => debug!("No handoff in progress"),
        rejected => warn!(expected = %expected_source, reason = %rejected, "Transfer token rejected"),
    }
    result
}

/// `true` iff the fragment carries the stored token, the token came from
/// `expected_source`, and it is no older than `ttl_ms`.
pub fn validate<S: Storage, C: Clock>(
    store: &TransferTokenStore<S>,
    clock: &C,
    fragment: &str,
    expected_source: AppId,
    ttl_ms: i64,
) -> bool {
    check(store, clock, fragment, expected_source, ttl_ms).is_valid()
}

fn evaluate<S: Storage, C: Clock>(
    store: &TransferTokenStore<S>,
    clock: &C,
    fragment: &str,
    expected_source: AppId,
    ttl_ms: i64,
) -> TransferCheck {
    let from_url = match HandoffMarker::parse(fragment) {
        HandoffMarker::Absent => return TransferCheck::NoMarker,
        HandoffMarker::Bare => return TransferCheck::NoToken,
        HandoffMarker::Token(value) => value,
    };

    let stored = match store.load() {
        Ok(StoredTransfer::Present(token)) => token,
        Ok(StoredTransfer::Missing(key)) => return TransferCheck::Missing(key),
        Ok(StoredTransfer::Malformed(key)) => return TransferCheck::Malformed(key),
        Err(e) => return TransferCheck::StorageUnavailable(e.to_string()),
    };

    if stored.value != from_url {
        debug!(
            stored = short_id(&stored.value),
            presented = short_id(from_url),
            "Transfer token values differ"
        );
        return TransferCheck::ValueMismatch;
    }

    if stored.source_app != expected_source {
        return TransferCheck::WrongSource {
            expected: expected_source,
            found: stored.source_app,
        };
    }

    let now = clock.now();
    if stored.is_expired_at(now, ttl_ms) {
        return TransferCheck::Expired {
            age_ms: stored.age_ms(now),
        };
    }

    TransferCheck::Valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::handoff::fragment::switcher_fragment;
    use crate::handoff::issuer::issue;
    use crate::handoff::store::{SOURCE_KEY, TIMESTAMP_KEY, TOKEN_KEY};
    use crate::storage::MemoryStorage;
    use crate::testing::BrokenStorage;

    const TTL: i64 = 30_000;

    struct Fixture {
        storage: MemoryStorage,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                storage: MemoryStorage::new(),
                clock: ManualClock::at_millis(0),
            }
        }

        fn store(&self) -> TransferTokenStore<&MemoryStorage> {
            TransferTokenStore::new(&self.storage)
        }

        /// Issue from `source` at t=0 and return the fragment carrying it
        fn issue_from(&self, source: AppId) -> String {
            let token = issue(&self.store(), &self.clock, source).unwrap();
            switcher_fragment(&token.value)
        }

        fn check_at(&self, millis: i64, fragment: &str, expected: AppId) -> TransferCheck {
            self.clock.set_millis(millis);
            check(&self.store(), &self.clock, fragment, expected, TTL)
        }
    }

    #[test]
    fn test_cross_app_token_within_window_is_valid() {
        let fx = Fixture::new();
        let fragment = fx.issue_from(AppId::AppA);
        assert_eq!(fx.check_at(10_000, &fragment, AppId::AppA), TransferCheck::Valid);
    }

    #[test]
    fn test_age_boundary() {
        let fx = Fixture::new();
        let fragment = fx.issue_from(AppId::AppA);
        assert!(fx.check_at(30_000, &fragment, AppId::AppA).is_valid());
        assert_eq!(
            fx.check_at(30_001, &fragment, AppId::AppA),
            TransferCheck::Expired { age_ms: 30_001 }
        );
        assert!(!fx.check_at(31_000, &fragment, AppId::AppA).is_valid());
    }

    #[test]
    fn test_self_consumption_is_rejected() {
        let fx = Fixture::new();
        let fragment = fx.issue_from(AppId::AppA);
        // App A validating its own token expects App B as the source
        assert_eq!(
            fx.check_at(1_000, &fragment, AppId::AppB),
            TransferCheck::WrongSource {
                expected: AppId::AppB,
                found: AppId::AppA
            }
        );
    }

    #[test]
    fn test_value_mismatch_is_rejected() {
        let fx = Fixture::new();
        fx.issue_from(AppId::AppA);
        assert_eq!(
            fx.check_at(1_000, "#switcher=forged-0", AppId::AppA),
            TransferCheck::ValueMismatch
        );
    }

    #[test]
    fn test_missing_entries_are_rejected() {
        let fx = Fixture::new();
        assert_eq!(
            fx.check_at(0, "#switcher=anything", AppId::AppA),
            TransferCheck::Missing(TOKEN_KEY)
        );

        let fragment = fx.issue_from(AppId::AppA);
        fx.storage.remove(SOURCE_KEY).unwrap();
        assert_eq!(
            fx.check_at(0, &fragment, AppId::AppA),
            TransferCheck::Missing(SOURCE_KEY)
        );
    }

    #[test]
    fn test_malformed_timestamp_is_rejected() {
        let fx = Fixture::new();
        let fragment = fx.issue_from(AppId::AppB);
        fx.storage.set(TIMESTAMP_KEY, "NaN").unwrap();
        assert_eq!(
            fx.check_at(0, &fragment, AppId::AppB),
            TransferCheck::Malformed(TIMESTAMP_KEY)
        );
    }

    #[test]
    fn test_marker_variants() {
        let fx = Fixture::new();
        fx.issue_from(AppId::AppA);
        assert_eq!(fx.check_at(0, "", AppId::AppA), TransferCheck::NoMarker);
        assert_eq!(fx.check_at(0, "#switcher", AppId::AppA), TransferCheck::NoToken);
    }

    #[test]
    fn test_validation_does_not_consume_token() {
        let fx = Fixture::new();
        let fragment = fx.issue_from(AppId::AppA);
        assert!(fx.check_at(0, &fragment, AppId::AppA).is_valid());
        assert!(fx.check_at(0, &fragment, AppId::AppA).is_valid());
        assert!(fx.storage.get(TOKEN_KEY).unwrap().is_some());
    }

    #[test]
    fn test_deleted_token_no_longer_validates() {
        let fx = Fixture::new();
        let fragment = fx.issue_from(AppId::AppA);
        assert!(validate(&fx.store(), &fx.clock, &fragment, AppId::AppA, TTL));
        fx.store().clear().unwrap();
        assert!(!validate(&fx.store(), &fx.clock, &fragment, AppId::AppA, TTL));
    }

    #[test]
    fn test_storage_failure_is_invalid_not_error() {
        let store = TransferTokenStore::new(BrokenStorage);
        let clock = ManualClock::at_millis(0);
        let result = check(&store, &clock, "#switcher=abc", AppId::AppA, TTL);
        assert!(matches!(result, TransferCheck::StorageUnavailable(_)));
        assert!(!result.is_valid());
    }
}
