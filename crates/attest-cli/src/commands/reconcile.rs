//! Orphan reconciliation command

use super::common::{print_json, Context};
use anyhow::Result;
use attest_core::{LedgerClock, SystemClock};
use attest_pipeline::Reconciler;
use clap::Args;
use serde_json::json;

/// Arguments of `attest reconcile`
#[derive(Args)]
pub struct ReconcileArgs {
    /// Keep reconciling on the configured interval until Ctrl-C
    #[arg(long)]
    pub watch: bool,

    /// Also settle entries younger than the deadline
    #[arg(long)]
    pub ignore_deadline: bool,
}

/// Reconcile the backlog once, or until interrupted
pub async fn run(ctx: &Context, args: ReconcileArgs) -> Result<()> {
    let reconciler = Reconciler::new(
        ctx.ledger.clone(),
        ctx.backlog.clone(),
        ctx.config.reconcile.clone(),
    )
    .with_call_timeout(ctx.config.pipeline.ledger_call_timeout());

    let report = if args.watch {
        tracing::info!(
            interval_secs = ctx.config.reconcile.interval_secs,
            "reconciling until interrupted"
        );
        reconciler
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
            })
            .await
    } else {
        let now = if args.ignore_deadline {
            u64::MAX
        } else {
            SystemClock.now_millis()
        };
        reconciler.reconcile_once(now).await
    };

    print_json(&json!({
        "report": report,
        "pending": ctx.backlog.pending(),
    }))
}
