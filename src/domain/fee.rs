//! Fee schedule and split arithmetic.
//!
//! Everything here is pure integer math on minor currency units. Any remainder
//! left by a percentage split goes to the platform, so the two shares always
//! add back up to the fee exactly.

use crate::domain::money::{Currency, Money};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One hundred percent, in basis points.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Depth of trust review, 0 (automated only) through 3 (expert panel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VerificationLevel(u8);

impl VerificationLevel {
    pub const BASIC: Self = Self(0);
    pub const FUNCTIONAL: Self = Self(1);
    pub const SECURITY: Self = Self(2);
    pub const EXPERT: Self = Self(3);
    pub const ALL: [Self; 4] = [Self::BASIC, Self::FUNCTIONAL, Self::SECURITY, Self::EXPERT];

    pub fn new(level: u8) -> Result<Self> {
        if level <= 3 {
            Ok(Self(level))
        } else {
            Err(EngineError::InvalidLevel(level))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Levels 2 and up fan out to an expert panel.
    pub fn requires_panel(self) -> bool {
        self.0 >= 2
    }
}

impl TryFrom<u8> for VerificationLevel {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<VerificationLevel> for u8 {
    fn from(level: VerificationLevel) -> Self {
        level.0
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of splitting a fee between the platform and the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub fee: Money,
    pub platform: Money,
    pub verifier: Money,
}

impl FeeSplit {
    pub const FREE: Self = Self {
        fee: Money::ZERO,
        platform: Money::ZERO,
        verifier: Money::ZERO,
    };
}

/// Splits `fee` so the platform keeps `platform_bps` basis points.
///
/// The verifier share is floored; the platform takes whatever is left.
pub fn split_amount(fee: Money, platform_bps: u32) -> Result<FeeSplit> {
    if fee.is_negative() {
        return Err(EngineError::validation(format!("fee {fee} is negative")));
    }
    if platform_bps > BPS_DENOMINATOR {
        return Err(EngineError::validation(format!(
            "platform rate {platform_bps} bps exceeds 100%"
        )));
    }
    let verifier_bps = i128::from(BPS_DENOMINATOR - platform_bps);
    let verifier = (i128::from(fee.minor_units()) * verifier_bps) / i128::from(BPS_DENOMINATOR);
    // verifier <= fee, so the narrowing is lossless
    let verifier = Money::new(verifier as i64);
    let platform = fee - verifier;
    debug_assert_eq!(platform + verifier, fee);
    Ok(FeeSplit {
        fee,
        platform,
        verifier,
    })
}

/// Platform commission on an order amount, with the same remainder rule as
/// [`split_amount`].
pub fn commission(amount: Money, platform_bps: u32) -> Result<Money> {
    split_amount(amount, platform_bps).map(|split| split.platform)
}

/// Fee and platform rate for one paid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFee {
    pub fee: Money,
    pub platform_bps: u32,
}

/// Fixed fee table keyed by level. Level 0 is always free and is therefore
/// not configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub currency: Currency,
    pub level_1: LevelFee,
    pub level_2: LevelFee,
    pub level_3: LevelFee,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            currency: Currency::Usd,
            level_1: LevelFee {
                fee: Money::new(5_000),
                platform_bps: 1_000,
            },
            level_2: LevelFee {
                fee: Money::new(15_000),
                platform_bps: 1_500,
            },
            level_3: LevelFee {
                fee: Money::new(40_000),
                platform_bps: 2_000,
            },
        }
    }
}

impl FeeSchedule {
    /// Table entry for a level; `None` for the free level.
    pub fn entry(&self, level: VerificationLevel) -> Option<LevelFee> {
        match level.value() {
            1 => Some(self.level_1),
            2 => Some(self.level_2),
            3 => Some(self.level_3),
            _ => None,
        }
    }

    /// The scheduled fee for `level`, split.
    pub fn quote(&self, level: VerificationLevel) -> Result<FeeSplit> {
        match self.entry(level) {
            Some(entry) => split_amount(entry.fee, entry.platform_bps),
            None => Ok(FeeSplit::FREE),
        }
    }

    /// Splits an arbitrary base fee with the rate configured for `level`.
    pub fn compute_split(&self, level: VerificationLevel, base_fee: Money) -> Result<FeeSplit> {
        match self.entry(level) {
            Some(entry) => split_amount(base_fee, entry.platform_bps),
            None if base_fee == Money::ZERO => Ok(FeeSplit::FREE),
            None => Err(EngineError::validation(format!(
                "level {level} is free, got fee {base_fee}"
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (level, entry) in [(1, self.level_1), (2, self.level_2), (3, self.level_3)] {
            if entry.fee.is_negative() {
                return Err(EngineError::ConfigError(format!(
                    "level {level} fee must not be negative"
                )));
            }
            if entry.platform_bps > BPS_DENOMINATOR {
                return Err(EngineError::ConfigError(format!(
                    "level {level} platform rate exceeds {BPS_DENOMINATOR} bps"
                )));
            }
        }
        Ok(())
    }
}
