//! Administrative commands

use super::common::{print_json, Context};
use anyhow::Result;
use attest_core::Principal;
use serde_json::json;

/// Grant or revoke `principal`
pub async fn authorize(
    ctx: &Context,
    principal: &str,
    authorized: bool,
    caller: Option<&str>,
) -> Result<()> {
    let principal = Principal::new(principal);
    ctx.ledger
        .authorize(&ctx.caller(caller), &principal, authorized)
        .await?;
    print_json(&ctx.ledger.stats(&principal))
}

/// Pause or unpause the ledger
pub async fn set_paused(ctx: &Context, paused: bool, caller: Option<&str>) -> Result<()> {
    let caller = ctx.caller(caller);
    if paused {
        ctx.ledger.pause(&caller).await?;
    } else {
        ctx.ledger.unpause(&caller).await?;
    }
    print_json(&json!({ "paused": ctx.ledger.is_paused() }))
}
