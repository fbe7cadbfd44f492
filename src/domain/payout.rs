//! Payout building blocks shared by seller settlements and verifier batches.
//!
//! Both walk `PENDING → PROCESSING → {PAID | FAILED}` with `FAILED` re-entering
//! `PROCESSING` on retry. Each keeps its own status enumeration; the
//! [`PayoutLifecycle`] trait only fixes the shape.

use crate::domain::ids::{PayoutBatchId, SellerId, SettlementId, VerifierId};
use crate::domain::money::{Currency, Money};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EngineError::validation(format!(
                "period start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// First day of `today`'s month through `today`.
    pub fn month_to_date(today: NaiveDate) -> Self {
        Self {
            start: today.with_day(1).unwrap_or(today),
            end: today,
        }
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start <= day && day <= self.end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    /// Transfer through the payment provider.
    BankTransfer,
    /// Paid out of band; an admin marks the result.
    Manual,
}

/// Where a payee receives funds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDestination {
    pub holder_name: Option<String>,
    pub account_number: Option<String>,
    pub institution: Option<String>,
}

/// Holder name, account number and institution must all be present and
/// non-blank before money can move.
pub fn validate_bank_account(destination: &PayoutDestination) -> Result<()> {
    let blank = |field: &Option<String>| field.as_deref().is_none_or(|v| v.trim().is_empty());
    let missing: Vec<&str> = [
        ("holder_name", &destination.holder_name),
        ("account_number", &destination.account_number),
        ("institution", &destination.institution),
    ]
    .into_iter()
    .filter(|(_, field)| blank(field))
    .map(|(name, _)| name)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::IncompletePayoutDestination(missing.join(", ")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Payee {
    Seller(SellerId),
    Verifier(VerifierId),
}

impl fmt::Display for Payee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payee::Seller(id) => write!(f, "seller:{id}"),
            Payee::Verifier(id) => write!(f, "verifier:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PayoutTarget {
    Settlement(SettlementId),
    VerifierBatch(PayoutBatchId),
}

/// What the payment provider is asked to move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub reference: String,
    pub payee: Payee,
    pub amount: Money,
    pub currency: Currency,
    pub destination: PayoutDestination,
}

/// Provider's asynchronous verdict on a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    Succeeded { paid_at: DateTime<Utc> },
    Failed { reason: String },
}

/// Payout-progress fields, the only part of a payout record that may change
/// once it has left `PENDING`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutProgress {
    pub method: Option<PayoutMethod>,
    pub transaction_reference: Option<String>,
    pub provider_reference: Option<String>,
    pub payout_date: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub attempts: u32,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Builds the reference sent to the provider; unique per attempt.
pub fn transaction_reference(prefix: &str, id: u64, attempt: u32, now: DateTime<Utc>) -> String {
    format!("{prefix}-{id:06}-{attempt}-{}", now.format("%Y%m%d%H%M%S"))
}

pub trait PayoutLifecycle {
    type Status: Copy + Eq + fmt::Display;

    const ENTITY: &'static str;
    const REFERENCE_PREFIX: &'static str;
    const PENDING: Self::Status;
    const PROCESSING: Self::Status;
    const PAID: Self::Status;
    const FAILED: Self::Status;

    fn raw_id(&self) -> u64;
    fn payee(&self) -> Payee;
    fn target(&self) -> PayoutTarget;
    fn amount(&self) -> Money;
    fn currency(&self) -> Currency;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    fn progress(&self) -> &PayoutProgress;
    fn progress_mut(&mut self) -> &mut PayoutProgress;
    /// Optimistic-concurrency version, mirrored locally after a successful write.
    fn version_mut(&mut self) -> &mut u64;

    fn ensure(&self, allowed: &[Self::Status], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status()) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                entity: Self::ENTITY,
                id: self.raw_id().to_string(),
                status: self.status().to_string(),
                action,
            })
        }
    }

    /// `PENDING | FAILED → PROCESSING`. Returns the new transaction reference.
    fn begin_payout(&mut self, method: PayoutMethod, now: DateTime<Utc>) -> Result<String> {
        self.ensure(&[Self::PENDING, Self::FAILED], "start payout")?;
        if !self.amount().is_positive() {
            return Err(EngineError::NonPositivePayout(self.amount().minor_units()));
        }
        let attempt = self.progress().attempts + 1;
        let reference = transaction_reference(Self::REFERENCE_PREFIX, self.raw_id(), attempt, now);
        let progress = self.progress_mut();
        progress.attempts = attempt;
        progress.method = Some(method);
        progress.transaction_reference = Some(reference.clone());
        progress.provider_reference = None;
        progress.failure_reason = None;
        progress.processed_at = Some(now);
        self.set_status(Self::PROCESSING);
        Ok(reference)
    }

    fn mark_paid(&mut self, payout_date: DateTime<Utc>) -> Result<()> {
        self.ensure(&[Self::PROCESSING], "be marked paid")?;
        self.progress_mut().payout_date = Some(payout_date);
        self.set_status(Self::PAID);
        Ok(())
    }

    fn mark_failed(&mut self, reason: String) -> Result<()> {
        self.ensure(&[Self::PROCESSING], "be marked failed")?;
        if reason.trim().is_empty() {
            return Err(EngineError::validation("a failure reason is required"));
        }
        self.progress_mut().failure_reason = Some(reason);
        self.set_status(Self::FAILED);
        Ok(())
    }
}
