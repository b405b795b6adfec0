//! Engine configuration.
//!
//! The engine reads an optional TOML file (`~/.stackwright/config.toml` by
//! default) providing the stack name, pseudo-parameter values and the retry
//! schedule used for provider operations. A missing file yields the defaults.
//!
//! ```toml
//! stack_name = "orders"
//!
//! [pseudo]
//! account_id = "123456789012"
//! region = "eu-west-1"
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! ```
//!
//! `STACKWRIGHT_REGION` and `STACKWRIGHT_ACCOUNT_ID` override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::core::StackError;

/// Environment variable overriding `pseudo.region`.
pub const REGION_ENV: &str = "STACKWRIGHT_REGION";
/// Environment variable overriding `pseudo.account_id`.
pub const ACCOUNT_ID_ENV: &str = "STACKWRIGHT_ACCOUNT_ID";

fn default_stack_name() -> String {
    "stack".to_string()
}

/// Values served for `AWS::*` pseudo-parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudoParameterConfig {
    /// `AWS::AccountId`
    pub account_id: String,
    /// `AWS::Region`
    pub region: String,
    /// `AWS::Partition`
    pub partition: String,
    /// `AWS::URLSuffix`
    pub url_suffix: String,
    /// `AWS::NotificationARNs`
    pub notification_arns: Vec<String>,
}

impl Default for PseudoParameterConfig {
    fn default() -> Self {
        Self {
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            partition: "aws".to_string(),
            url_suffix: "amazonaws.com".to_string(),
            notification_arns: Vec::new(),
        }
    }
}

/// Retry schedule for retryable provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every subsequent retry
    pub base_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// A schedule with no delays, for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// The delay before the first retry.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// The delay cap.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `AWS::StackName`, also the seed for `AWS::StackId`
    #[serde(default = "default_stack_name")]
    pub stack_name: String,
    /// Pseudo-parameter values
    #[serde(default)]
    pub pseudo: PseudoParameterConfig,
    /// Provider retry schedule
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_name: default_stack_name(),
            pseudo: PseudoParameterConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// A default configuration for the named stack.
    pub fn for_stack(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..Self::default()
        }
    }

    /// Load from the default location, falling back to defaults when the file
    /// does not exist. Environment overrides are applied.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, else from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        let mut config = if path.exists() {
            Self::load_from(&path).await?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file. No environment overrides are applied.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// `~/.stackwright/config.toml`, or the local data directory on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("stackwright")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".stackwright")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Apply `STACKWRIGHT_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup(REGION_ENV).filter(|v| !v.is_empty()) {
            self.pseudo.region = region;
        }
        if let Some(account_id) = lookup(ACCOUNT_ID_ENV).filter(|v| !v.is_empty()) {
            self.pseudo.account_id = account_id;
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), StackError> {
        if self.stack_name.trim().is_empty() {
            return Err(StackError::ConfigError {
                message: "stack_name must not be empty".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(StackError::ConfigError {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(StackError::ConfigError {
                message: format!(
                    "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }
        Ok(())
    }
}
