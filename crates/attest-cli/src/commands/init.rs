//! Init command

use anyhow::{bail, Result};
use attest_core::{AttestConfig, Principal};
use std::path::Path;

/// Write a configuration whose state lives under `output`
pub fn run(config_path: &Path, output: &Path, administrator: Option<&str>) -> Result<()> {
    if config_path.exists() {
        bail!("config already exists at {}", config_path.display());
    }

    let config = default_config(output, administrator);
    config.validate()?;
    config.save_to_file(config_path)?;

    tracing::info!(
        config = %config_path.display(),
        administrator = %config.ledger.administrator,
        "initialized attest configuration"
    );
    super::common::print_json(&config)
}

fn default_config(output: &Path, administrator: Option<&str>) -> AttestConfig {
    let mut config = AttestConfig::defaults();
    if let Some(admin) = administrator {
        config.ledger.administrator = Principal::new(admin);
    }
    config.ledger.journal_path = Some(output.join("ledger.jsonl"));
    config.store.root = output.join("content");
    config.reconcile.backlog_path = Some(output.join("orphans.json"));
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let state = dir.path().join("state");

        run(&config_path, &state, Some("0xB0B")).unwrap();
        let loaded = AttestConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.ledger.administrator, Principal::new("0xb0b"));
        assert_eq!(loaded.ledger.journal_path, Some(state.join("ledger.jsonl")));
        assert_eq!(loaded.reconcile.backlog_path, Some(state.join("orphans.json")));

        assert!(run(&config_path, &state, None).is_err());
    }
}
