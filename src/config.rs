//! Engine configuration, loaded from TOML.

use crate::domain::fee::{BPS_DENOMINATOR, FeeSchedule};
use crate::domain::money::Currency;
use crate::domain::payout::{Payee, PayoutDestination};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Currency every fee, order and payout is denominated in.
    #[serde(default)]
    pub currency: Currency,

    /// Verification fee table.
    #[serde(default)]
    pub fees: FeeSchedule,

    /// Platform commission applied to imported orders that carry no fee.
    #[serde(default = "default_commission_bps")]
    pub order_commission_bps: u32,

    #[serde(default)]
    pub staleness: StalenessConfig,

    #[serde(default)]
    pub automated_checks: AutomatedCheckConfig,

    /// Static payout destinations, used when no external directory is wired.
    #[serde(default)]
    pub payees: Vec<PayeeEntry>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Upper bound for a staleness threshold: one year.
pub const MAX_STALENESS_HOURS: i64 = 24 * 365;

/// Thresholds after which open work is reported as stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessConfig {
    #[serde(default = "default_assignment_hours")]
    pub assignment_hours: i64,
    #[serde(default = "default_expert_review_hours")]
    pub expert_review_hours: i64,
}

/// Limits for the level 0 automated checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedCheckConfig {
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_min_description_chars")]
    pub min_description_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeEntry {
    pub payee: Payee,
    #[serde(flatten)]
    pub destination: PayoutDestination,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            fees: FeeSchedule::default(),
            order_commission_bps: default_commission_bps(),
            staleness: StalenessConfig::default(),
            automated_checks: AutomatedCheckConfig::default(),
            payees: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            assignment_hours: default_assignment_hours(),
            expert_review_hours: default_expert_review_hours(),
        }
    }
}

impl Default for AutomatedCheckConfig {
    fn default() -> Self {
        Self {
            max_artifact_bytes: default_max_artifact_bytes(),
            allowed_extensions: default_allowed_extensions(),
            min_description_chars: default_min_description_chars(),
        }
    }
}

const fn default_commission_bps() -> u32 {
    1_000
}

const fn default_assignment_hours() -> i64 {
    48
}

const fn default_expert_review_hours() -> i64 {
    72
}

const fn default_max_artifact_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["json", "zip", "yaml", "yml", "py", "js", "ts"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_min_description_chars() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.fees.validate()?;
        if self.fees.currency != self.currency {
            return Err(EngineError::ConfigError(format!(
                "fee schedule is in {} but the engine settles in {}",
                self.fees.currency, self.currency
            )));
        }
        if self.order_commission_bps > BPS_DENOMINATOR {
            return Err(EngineError::ConfigError(format!(
                "order commission exceeds {BPS_DENOMINATOR} bps"
            )));
        }
        for (name, hours) in [
            ("assignment_hours", self.staleness.assignment_hours),
            ("expert_review_hours", self.staleness.expert_review_hours),
        ] {
            if !(1..=MAX_STALENESS_HOURS).contains(&hours) {
                return Err(EngineError::ConfigError(format!(
                    "staleness.{name} must be between 1 and {MAX_STALENESS_HOURS}, got {hours}"
                )));
            }
        }
        Ok(())
    }

    /// Clamped to the validated range so an unchecked config cannot overflow.
    pub fn assignment_staleness(&self) -> chrono::Duration {
        staleness_hours(self.staleness.assignment_hours)
    }

    pub fn expert_review_staleness(&self) -> chrono::Duration {
        staleness_hours(self.staleness.expert_review_hours)
    }
}

fn staleness_hours(hours: i64) -> chrono::Duration {
    chrono::Duration::hours(hours.clamp(1, MAX_STALENESS_HOURS))
}
