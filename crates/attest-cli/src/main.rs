//! Operator CLI for Attest
//!
//! Records SME transactions against the ledger, binds them to documents in
//! the content store and answers verification queries. State lives in the
//! journal, store directory and orphan backlog named by the config file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{
    admin, common, init, query,
    reconcile::{self, ReconcileArgs},
    submit::{self, SubmitArgs},
};

#[derive(Parser)]
#[command(name = "attest")]
#[command(about = "Attest - verifiable transaction ledger for small enterprises", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".attest/config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init {
        /// Directory holding the journal, store and backlog
        #[arg(short, long, default_value = ".attest")]
        output: PathBuf,

        /// Administrator principal
        #[arg(long)]
        administrator: Option<String>,
    },

    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Commands that operate on an initialized ledger
#[derive(Subcommand)]
enum LedgerCommand {
    /// Grant or revoke a principal's permission to record transactions
    Authorize {
        /// Principal address
        principal: String,

        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,

        /// Acting principal; defaults to the configured administrator
        #[arg(long = "as")]
        caller: Option<String>,
    },

    /// Store a document and record its transaction
    Submit(SubmitArgs),

    /// List a principal's transactions in commit order
    Trail {
        /// Principal address
        principal: String,
    },

    /// Look up a recorded transaction
    Verify {
        /// Token id
        token_id: String,

        /// Only match records owned by this principal
        #[arg(long)]
        principal: Option<String>,
    },

    /// Check a local file against the hash recorded for a transaction
    VerifyFile {
        /// Token id
        token_id: String,

        /// File to check
        file: PathBuf,
    },

    /// Show a principal's authorization and transaction count
    Stats {
        /// Principal address
        principal: String,
    },

    /// Stop accepting new transactions
    Pause {
        /// Acting principal; defaults to the configured administrator
        #[arg(long = "as")]
        caller: Option<String>,
    },

    /// Resume accepting transactions
    Unpause {
        /// Acting principal; defaults to the configured administrator
        #[arg(long = "as")]
        caller: Option<String>,
    },

    /// Settle orphaned documents against the ledger
    Reconcile(ReconcileArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init {
            output,
            administrator,
        } => init::run(&cli.config, &output, administrator.as_deref())?,
        Commands::Ledger(command) => {
            let config = common::load_config(&cli.config)?;
            let ctx = common::Context::open(config)?;
            dispatch(&ctx, command).await?;
        }
    }

    Ok(())
}

async fn dispatch(ctx: &common::Context, command: LedgerCommand) -> Result<()> {
    match command {
        LedgerCommand::Authorize {
            principal,
            revoke,
            caller,
        } => admin::authorize(ctx, &principal, !revoke, caller.as_deref()).await,
        LedgerCommand::Submit(args) => submit::run(ctx, args).await,
        LedgerCommand::Trail { principal } => query::trail(ctx, &principal).await,
        LedgerCommand::Verify {
            token_id,
            principal,
        } => query::verify(ctx, &token_id, principal.as_deref()).await,
        LedgerCommand::VerifyFile { token_id, file } => {
            submit::verify_file(ctx, &token_id, &file).await
        }
        LedgerCommand::Stats { principal } => query::stats(ctx, &principal),
        LedgerCommand::Pause { caller } => admin::set_paused(ctx, true, caller.as_deref()).await,
        LedgerCommand::Unpause { caller } => {
            admin::set_paused(ctx, false, caller.as_deref()).await
        }
        LedgerCommand::Reconcile(args) => reconcile::run(ctx, args).await,
    }
}
