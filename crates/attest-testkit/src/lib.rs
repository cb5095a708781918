//! Attest testing infrastructure
//!
//! Fault-injecting doubles for the two external collaborators, a manual
//! clock and shared fixtures.
//!
//! ```toml
//! [dev-dependencies]
//! attest-testkit = { path = "../attest-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod clock;
pub mod fixtures;
pub mod ledger;
pub mod store;

pub use clock::ManualClock;
pub use fixtures::*;
pub use ledger::FlakyLedger;
pub use store::FlakyContentStore;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{content_hash, LedgerClock};
    use attest_ledger::LedgerClient;
    use attest_store::ContentStore;
    use std::time::Duration;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 3_000);
        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn test_documents_are_deterministic() {
        assert_eq!(document(7, 32), document(7, 32));
        assert_ne!(document(7, 32), document(8, 32));
    }

    #[tokio::test]
    async fn test_flaky_store_counts_failures() {
        let store = FlakyContentStore::default();
        store.fail_next_puts(2);
        assert!(store.put(b"a".to_vec()).await.is_err());
        assert!(store.put(b"a".to_vec()).await.is_err());
        assert!(store.put(b"a".to_vec()).await.is_ok());
        assert_eq!(store.put_calls(), 3);
        assert_eq!(store.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_ack_still_applies() {
        init_tracing();
        let p = principal(1);
        let ledger = FlakyLedger::new(ledger_with(&[p.clone()]).await);
        ledger.lose_next_acks(1);

        let req = append_request("T1", &p, content_hash(b"doc"));
        let err = ledger.append(req.clone()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.inner().verify(&req.token_id, &p).is_some());

        ledger.fail_next_appends(1);
        assert!(ledger.append(append_request("T2", &p, content_hash(b"d2"))).await.is_err());
        assert!(ledger.inner().verify(&attest_core::TokenId::new("T2"), &p).is_none());
        assert_eq!(ledger.append_calls(), 2);
    }
}
