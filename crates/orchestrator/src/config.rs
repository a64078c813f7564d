//! Engine configuration loaded from the environment.
//!
//! - `KARAT_CONFIG`: path to a JSON file holding a full [`EngineConfig`]
//! - `KARAT_APPROVAL_RULES`: inline JSON array of approval rules
//! - `KARAT_DEFAULT_LOW_STOCK_THRESHOLD`: threshold for lines without one
//! - `KARAT_LOG`: tracing filter directive
//!
//! Individual variables override values from the file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use karat_approvals::{ApprovalRule, validate_rules};

pub const CONFIG_PATH_VAR: &str = "KARAT_CONFIG";
pub const APPROVAL_RULES_VAR: &str = "KARAT_APPROVAL_RULES";
pub const LOW_STOCK_THRESHOLD_VAR: &str = "KARAT_DEFAULT_LOW_STOCK_THRESHOLD";
pub const LOG_FILTER_VAR: &str = "KARAT_LOG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub approval_rules: Vec<ApprovalRule>,
    /// Applied to line items that carry no low-stock threshold of their own.
    pub default_low_stock_threshold: Option<i64>,
    pub log_filter: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };

        if let Some(raw) = lookup(APPROVAL_RULES_VAR) {
            config.approval_rules = serde_json::from_str(&raw)
                .with_context(|| format!("{APPROVAL_RULES_VAR} is not a JSON array of rules"))?;
        }
        if let Some(raw) = lookup(LOW_STOCK_THRESHOLD_VAR) {
            let threshold: i64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{LOW_STOCK_THRESHOLD_VAR} must be an integer, got {raw:?}"))?;
            config.default_low_stock_threshold = Some(threshold);
        }
        if let Some(filter) = lookup(LOG_FILTER_VAR) {
            config.log_filter = Some(filter);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("invalid engine config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        validate_rules(&self.approval_rules).context("invalid approval rules")?;
        if let Some(threshold) = self.default_low_stock_threshold {
            anyhow::ensure!(
                threshold >= 0,
                "default low-stock threshold cannot be negative (got {threshold})"
            );
        }
        Ok(())
    }
}
