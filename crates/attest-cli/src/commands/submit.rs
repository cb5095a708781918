//! Document submission and file verification

use super::common::{print_json, Context};
use anyhow::{bail, Context as _, Result};
use attest_core::{content_hash, Principal, TokenId, TokenIdGenerator, TransactionType};
use attest_ledger::LedgerClient;
use attest_pipeline::{Submission, SubmissionMetadata};
use clap::Args;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Arguments of `attest submit`
#[derive(Args)]
pub struct SubmitArgs {
    /// Submitting principal
    #[arg(long)]
    pub principal: String,

    /// Transaction type (payment, invoice, expense, receipt, refund, contract, other)
    #[arg(long = "type")]
    pub transaction_type: TransactionType,

    /// Amount in the lowest denomination
    #[arg(long)]
    pub amount: u64,

    /// Token id; generated when omitted
    #[arg(long)]
    pub token_id: Option<String>,

    /// ISO currency code
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// Free-form description
    #[arg(long)]
    pub description: Option<String>,

    /// Document to record
    pub file: PathBuf,
}

/// Run a submission through the commit pipeline
pub async fn run(ctx: &Context, args: SubmitArgs) -> Result<()> {
    let document = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let principal = Principal::new(args.principal);
    let token_id = match args.token_id {
        Some(id) => TokenId::new(id),
        None => TokenIdGenerator.generate(
            principal.as_str(),
            args.transaction_type,
            chrono::Utc::now(),
        ),
    };
    let metadata = SubmissionMetadata {
        currency: args.currency,
        description: args.description,
        file_name: args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };
    let submission = Submission::new(
        token_id,
        principal,
        args.transaction_type,
        args.amount,
        document,
    )
    .with_metadata(metadata);

    match ctx.pipeline().submit(submission).await {
        Ok(receipt) => print_json(&receipt),
        Err(e) => {
            print_json(&json!({
                "token_id": e.token_id(),
                "state": e.state().to_string(),
                "reason": e.reason().as_str(),
                "field": e.field(),
                "retryable": e.is_retryable(),
                "orphaned_pointer": e.orphan(),
            }))?;
            Err(e.into())
        }
    }
}

/// Compare a local file with the recorded hash and the stored copy
pub async fn verify_file(ctx: &Context, token_id: &str, file: &Path) -> Result<()> {
    let token_id = TokenId::new(token_id);
    let Some(record) = ctx.ledger.lookup_by_token(&token_id).await? else {
        bail!("no transaction recorded under {token_id}");
    };

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let local_hash = content_hash(&bytes);
    let matches_ledger = ctx
        .ledger
        .verify_integrity(&token_id, &record.principal, &local_hash)
        .await?;

    let stored_intact = match ctx
        .store()
        .fetch_verified(&record.content_pointer, &record.content_hash)
        .await
    {
        Ok(intact) => Some(intact),
        Err(e) => {
            tracing::warn!(pointer = %record.content_pointer, error = %e, "stored copy unavailable");
            None
        }
    };

    print_json(&json!({
        "token_id": token_id,
        "file_hash": local_hash,
        "recorded_hash": record.content_hash,
        "matches_ledger": matches_ledger,
        "stored_copy_intact": stored_intact,
    }))?;
    if !matches_ledger {
        bail!("{} does not match the document recorded under {token_id}", file.display());
    }
    Ok(())
}
