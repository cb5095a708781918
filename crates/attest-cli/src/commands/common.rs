//! Shared plumbing: configuration, collaborators and output

use anyhow::{Context as _, Result};
use attest_core::{AttestConfig, Principal};
use attest_ledger::{LedgerHandle, LedgerService};
use attest_pipeline::{CommitPipeline, OrphanBacklog};
use attest_store::{ContentStoreClient, FilesystemContentStore};
use serde::Serialize;
use std::path::Path;

/// Load, override and validate the configuration at `path`
pub fn load_config(path: &Path) -> Result<AttestConfig> {
    let mut config = AttestConfig::load_from_file(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    config.merge_with_env()?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Everything a ledger command needs
pub struct Context {
    /// Validated configuration
    pub config: AttestConfig,
    /// Running ledger sequencer
    pub ledger: LedgerHandle,
    /// Orphan backlog shared with the pipeline
    pub backlog: OrphanBacklog,
}

impl Context {
    /// Replay the journal, start the sequencer and load the orphan backlog
    pub fn open(config: AttestConfig) -> Result<Self> {
        let ledger = LedgerService::open(&config.ledger).context("opening ledger")?;
        let backlog = match &config.reconcile.backlog_path {
            Some(path) => OrphanBacklog::open(path)
                .with_context(|| format!("loading orphan backlog {}", path.display()))?,
            None => OrphanBacklog::new(),
        };
        tracing::debug!(
            transactions = ledger.total_transactions(),
            orphans = backlog.len(),
            "ledger opened"
        );
        Ok(Self {
            config,
            ledger,
            backlog,
        })
    }

    /// Explicit caller, or the configured administrator
    pub fn caller(&self, caller: Option<&str>) -> Principal {
        caller
            .map(Principal::new)
            .unwrap_or_else(|| self.config.ledger.administrator.clone())
    }

    /// Client for the configured filesystem store
    pub fn store(&self) -> ContentStoreClient<FilesystemContentStore> {
        ContentStoreClient::new(
            FilesystemContentStore::new(&self.config.store.root),
            self.config.store.call_timeout(),
        )
    }

    /// Commit pipeline over the configured store and ledger
    pub fn pipeline(&self) -> CommitPipeline<FilesystemContentStore, LedgerHandle> {
        CommitPipeline::new(
            self.store(),
            self.ledger.clone(),
            self.config.pipeline.clone(),
        )
        .with_backlog(self.backlog.clone())
    }
}

/// Pretty-print `value` as JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
