//! Read-only ledger queries

use super::common::{print_json, Context};
use anyhow::{bail, Result};
use attest_core::{Principal, TokenId};
use attest_ledger::LedgerClient;

/// Print a principal's records in commit order
pub async fn trail(ctx: &Context, principal: &str) -> Result<()> {
    let trail = ctx.ledger.get_trail(&Principal::new(principal)).await?;
    print_json(&trail)
}

/// Print the record for `token_id`
pub async fn verify(ctx: &Context, token_id: &str, principal: Option<&str>) -> Result<()> {
    let token_id = TokenId::new(token_id);
    let record = match principal {
        Some(p) => ctx.ledger.verify(&token_id, &Principal::new(p)),
        None => ctx.ledger.lookup_by_token(&token_id).await?,
    };
    match record {
        Some(record) => print_json(&record),
        None => bail!("no transaction recorded under {token_id}"),
    }
}

/// Print authorization and transaction count
pub fn stats(ctx: &Context, principal: &str) -> Result<()> {
    print_json(&ctx.ledger.stats(&Principal::new(principal)))
}
