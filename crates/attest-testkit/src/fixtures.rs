//! Common fixtures

use attest_core::{AttestResult, ContentHash, ContentPointer, LedgerClock, Principal, TokenId};
use attest_ledger::{AppendRequest, Ledger, LedgerHandle, LedgerService};
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Administrator used throughout the tests
pub fn admin() -> Principal {
    Principal::new("0xa11ce00000000000000000000000000000000001")
}

/// Deterministic non-zero principal number `n`
pub fn principal(n: u32) -> Principal {
    Principal::new(format!("0x{:040x}", u64::from(n) + 0x5e0000))
}

/// Deterministic pseudo-random document of `len` bytes
pub fn document(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Well-formed append request for `principal`
pub fn append_request(token: &str, principal: &Principal, hash: ContentHash) -> AppendRequest {
    AppendRequest {
        token_id: TokenId::new(token),
        transaction_type: "PAYMENT".to_string(),
        amount: 100,
        content_hash: hash,
        content_pointer: ContentPointer::new(format!("ptr-{token}-{}", &hash.to_hex()[..8])),
        principal: principal.clone(),
    }
}

/// Running ledger with `principals` authorized
pub async fn ledger_with(principals: &[Principal]) -> LedgerHandle {
    start(Ledger::builder(admin()).open(), principals).await
}

/// Running ledger on `clock` with `principals` authorized
pub async fn ledger_with_clock(
    clock: Arc<dyn LedgerClock>,
    principals: &[Principal],
) -> LedgerHandle {
    start(Ledger::builder(admin()).clock(clock).open(), principals).await
}

async fn start(ledger: AttestResult<Ledger>, principals: &[Principal]) -> LedgerHandle {
    let handle = ledger
        .and_then(LedgerService::start)
        .unwrap_or_else(|e| panic!("fixture ledger failed to start: {e}"));
    if !principals.is_empty() {
        let statuses = vec![true; principals.len()];
        handle
            .batch_authorize(&admin(), principals, &statuses)
            .await
            .unwrap_or_else(|e| panic!("fixture authorization failed: {e}"));
    }
    handle
}
