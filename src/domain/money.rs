use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// ISO currency supported by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Krw,
    Jpy,
}

impl Currency {
    /// Number of decimal digits in one major unit.
    pub fn minor_exponent(self) -> u32 {
        match self {
            Currency::Usd | Currency::Eur => 2,
            Currency::Krw | Currency::Jpy => 0,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Krw => "KRW",
            Currency::Jpy => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "KRW" => Ok(Currency::Krw),
            "JPY" => Ok(Currency::Jpy),
            other => Err(EngineError::validation(format!("unknown currency '{other}'"))),
        }
    }
}

/// An amount in the smallest unit of its currency (cents, won).
///
/// All fee and settlement arithmetic happens on this integer type; `Decimal`
/// only appears at the edges, when amounts are read from or written to
/// human-facing formats.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Converts a major-unit decimal (e.g. `12.50` USD) into minor units.
    ///
    /// Rejects values carrying more precision than the currency allows.
    pub fn from_major(value: Decimal, currency: Currency) -> Result<Self> {
        let scaled = value
            .checked_mul(Decimal::from(10_i64.pow(currency.minor_exponent())))
            .ok_or_else(|| EngineError::validation(format!("{value} is out of range")))?;
        if !scaled.fract().is_zero() {
            return Err(EngineError::validation(format!(
                "{value} has more precision than {currency} allows"
            )));
        }
        scaled
            .to_i64()
            .map(Self)
            .ok_or_else(|| EngineError::validation(format!("{value} is out of range")))
    }

    /// Sum that reports overflow instead of wrapping; used wherever totals are
    /// built from imported data.
    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| EngineError::validation(format!("{self} + {rhs} overflows")))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or_else(|| EngineError::validation(format!("{self} - {rhs} overflows")))
    }

    pub fn to_major(self, currency: Currency) -> Decimal {
        Decimal::new(self.0, currency.minor_exponent())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Operators are for single fee splits; totals go through `checked_add`.
impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}
