//! Configuration for the attest stack
//!
//! Loaded from TOML, optionally overridden by `ATTEST_*` environment
//! variables, then validated. A missing file yields the defaults.

use crate::errors::{AttestError, Result};
use crate::identifiers::Principal;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default administrator used by freshly generated configurations
pub const DEFAULT_ADMINISTRATOR: &str = "0xa11ce00000000000000000000000000000000001";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ATTEST_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    /// Ledger settings
    pub ledger: LedgerConfig,
    /// Content store settings
    pub store: StoreConfig,
    /// Commit pipeline settings
    pub pipeline: PipelineConfig,
    /// Orphan reconciliation settings
    pub reconcile: ReconcileConfig,
}

/// Ledger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// The single identity allowed to authorize principals and pause the ledger
    pub administrator: Principal,
    /// Append-only journal file; in-memory only when unset
    pub journal_path: Option<PathBuf>,
    /// Capacity of the event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            administrator: Principal::new(DEFAULT_ADMINISTRATOR),
            journal_path: None,
            event_channel_capacity: 1024,
        }
    }
}

/// Content store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the filesystem store
    pub root: PathBuf,
    /// Timeout applied to every store call
    pub call_timeout_ms: u64,
}

impl StoreConfig {
    /// Call timeout as a duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".attest/content"),
            call_timeout_ms: 10_000,
        }
    }
}

/// Commit pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retry policy for uploads
    pub store_retry: RetryPolicy,
    /// Retry policy for ledger appends
    pub ledger_retry: RetryPolicy,
    /// Timeout applied to every ledger call
    pub ledger_call_timeout_ms: u64,
}

impl PipelineConfig {
    /// Ledger call timeout as a duration
    pub fn ledger_call_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_call_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_retry: RetryPolicy::exponential().with_max_attempts(4),
            ledger_retry: RetryPolicy::exponential().with_max_attempts(4),
            ledger_call_timeout_ms: 5_000,
        }
    }
}

/// Orphan reconciliation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Age after which a pending orphan is picked up
    pub deadline_secs: u64,
    /// Pause between background passes
    pub interval_secs: u64,
    /// Ledger retries per orphan before it is abandoned
    pub max_attempts: u32,
    /// File the orphan backlog is persisted to; in-memory only when unset
    pub backlog_path: Option<PathBuf>,
}

impl ReconcileConfig {
    /// Deadline as a duration
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 300,
            interval_secs: 60,
            max_attempts: 5,
            backlog_path: None,
        }
    }
}

impl AttestConfig {
    /// Default configuration values
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AttestError::internal(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            AttestError::config(
                "file",
                format!("Failed to parse config file {}: {e}", path.display()),
            )
        })
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AttestError::internal(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `ATTEST_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from an explicit set of variables
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "ADMINISTRATOR" => self.ledger.administrator = Principal::new(value),
                "JOURNAL_PATH" => self.ledger.journal_path = Some(PathBuf::from(value)),
                "BACKLOG_PATH" => self.reconcile.backlog_path = Some(PathBuf::from(value)),
                "STORE_ROOT" => self.store.root = PathBuf::from(value),
                "STORE_TIMEOUT_MS" => self.store.call_timeout_ms = parse_number(&key, &value)?,
                "LEDGER_TIMEOUT_MS" => {
                    self.pipeline.ledger_call_timeout_ms = parse_number(&key, &value)?;
                }
                _ => tracing::debug!(%key, "ignoring unknown override"),
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.ledger
            .administrator
            .validate()
            .map_err(|e| AttestError::config("ledger.administrator", e.to_string()))?;
        if self.ledger.event_channel_capacity == 0 {
            return Err(AttestError::config(
                "ledger.event_channel_capacity",
                "must be at least 1",
            ));
        }
        for (field, policy) in [
            ("pipeline.store_retry", &self.pipeline.store_retry),
            ("pipeline.ledger_retry", &self.pipeline.ledger_retry),
        ] {
            if policy.max_attempts == 0 {
                return Err(AttestError::config(field, "max_attempts must be at least 1"));
            }
            if policy.backoff_factor == 0 {
                return Err(AttestError::config(field, "backoff_factor must be at least 1"));
            }
        }
        if self.store.call_timeout_ms == 0 {
            return Err(AttestError::config("store.call_timeout_ms", "must be positive"));
        }
        if self.pipeline.ledger_call_timeout_ms == 0 {
            return Err(AttestError::config(
                "pipeline.ledger_call_timeout_ms",
                "must be positive",
            ));
        }
        if self.reconcile.interval_secs == 0 {
            return Err(AttestError::config(
                "reconcile.interval_secs",
                "must be positive",
            ));
        }
        if self.reconcile.max_attempts == 0 {
            return Err(AttestError::config(
                "reconcile.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|e| AttestError::config(key, format!("'{value}' is not a number: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReasonCode;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AttestConfig::defaults().validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AttestConfig::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AttestConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = AttestConfig::default();
        config.ledger.administrator = Principal::new("0xb0b");
        config.pipeline.ledger_retry = RetryPolicy::none();
        config.save_to_file(&path).unwrap();

        let loaded = AttestConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ledger]\nadministrator = \"0xADMIN1\"\n").unwrap();
        let config = AttestConfig::load_from_file(&path).unwrap();
        assert_eq!(config.ledger.administrator.as_str(), "0xadmin1");
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AttestConfig::default();
        config
            .merge_with_vars(vec![
                ("ATTEST_ADMINISTRATOR".to_string(), "0xC0FFEE".to_string()),
                ("ATTEST_STORE_TIMEOUT_MS".to_string(), "250".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.ledger.administrator.as_str(), "0xc0ffee");
        assert_eq!(config.store.call_timeout_ms, 250);

        let err = config
            .merge_with_vars(vec![("ATTEST_STORE_TIMEOUT_MS".to_string(), "soon".to_string())])
            .unwrap_err();
        assert_eq!(err.reason(), ReasonCode::InvalidConfig);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AttestConfig::default();
        config.pipeline.store_retry.max_attempts = 0;
        assert_eq!(config.validate().unwrap_err().field(), Some("pipeline.store_retry"));

        let mut config = AttestConfig::default();
        config.ledger.administrator = Principal::new("0x0");
        assert_eq!(
            config.validate().unwrap_err().field(),
            Some("ledger.administrator")
        );
    }
}
