use crate::domain::ids::{PayoutBatchId, VerificationId, VerifierId};
use crate::domain::money::{Currency, Money};
use crate::domain::payout::{Payee, PayoutLifecycle, PayoutProgress, PayoutTarget, Period};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A verifier's earning for one approved verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierPayout {
    pub verifier: VerifierId,
    pub verification: VerificationId,
    pub amount: Money,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutBatchStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl PayoutBatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoutBatchStatus::Pending => "PENDING",
            PayoutBatchStatus::Processing => "PROCESSING",
            PayoutBatchStatus::Paid => "PAID",
            PayoutBatchStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PayoutBatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line items of one verifier and period, summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub line_count: u32,
    pub total: Money,
    pub currency: Currency,
}

impl BatchTotals {
    pub fn aggregate(currency: Currency, period: &Period, lines: &[VerifierPayout]) -> Result<Self> {
        let mut totals = BatchTotals {
            line_count: 0,
            total: Money::ZERO,
            currency,
        };
        for line in lines.iter().filter(|l| period.contains(l.created_at)) {
            if line.currency != currency {
                return Err(EngineError::CurrencyMismatch {
                    expected: currency,
                    found: line.currency,
                });
            }
            totals.line_count += 1;
            totals.total = totals.total.checked_add(line.amount)?;
        }
        Ok(totals)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierPayoutBatch {
    pub id: PayoutBatchId,
    pub verifier: VerifierId,
    pub period: Period,
    #[serde(flatten)]
    pub totals: BatchTotals,
    pub status: PayoutBatchStatus,
    pub payout: PayoutProgress,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl VerifierPayoutBatch {
    pub fn new(
        id: PayoutBatchId,
        verifier: VerifierId,
        period: Period,
        totals: BatchTotals,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            verifier,
            period,
            totals,
            status: PayoutBatchStatus::Pending,
            payout: PayoutProgress::default(),
            created_at: now,
            version: 0,
        }
    }
}

impl PayoutLifecycle for VerifierPayoutBatch {
    type Status = PayoutBatchStatus;

    const ENTITY: &'static str = "verifier payout batch";
    const REFERENCE_PREFIX: &'static str = "VPB";
    const PENDING: PayoutBatchStatus = PayoutBatchStatus::Pending;
    const PROCESSING: PayoutBatchStatus = PayoutBatchStatus::Processing;
    const PAID: PayoutBatchStatus = PayoutBatchStatus::Paid;
    const FAILED: PayoutBatchStatus = PayoutBatchStatus::Failed;

    fn raw_id(&self) -> u64 {
        self.id.0
    }

    fn payee(&self) -> Payee {
        Payee::Verifier(self.verifier)
    }

    fn target(&self) -> PayoutTarget {
        PayoutTarget::VerifierBatch(self.id)
    }

    fn amount(&self) -> Money {
        self.totals.total
    }

    fn currency(&self) -> Currency {
        self.totals.currency
    }

    fn status(&self) -> PayoutBatchStatus {
        self.status
    }

    fn set_status(&mut self, status: PayoutBatchStatus) {
        self.status = status;
    }

    fn progress(&self) -> &PayoutProgress {
        &self.payout
    }

    fn progress_mut(&mut self) -> &mut PayoutProgress {
        &mut self.payout
    }

    fn version_mut(&mut self) -> &mut u64 {
        &mut self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payout::PayoutMethod;
    use crate::domain::settlement::tests::{at, january};

    fn line(verification: u64, amount: i64, created_at: DateTime<Utc>) -> VerifierPayout {
        VerifierPayout {
            verifier: VerifierId(5),
            verification: VerificationId(verification),
            amount: Money::new(amount),
            currency: Currency::Usd,
            created_at,
        }
    }

    #[test]
    fn test_batch_totals_only_count_period() {
        let lines = vec![
            line(1, 4_500, at(2026, 1, 3)),
            line(2, 12_750, at(2026, 1, 28)),
            line(3, 4_500, at(2026, 2, 2)),
        ];
        let totals = BatchTotals::aggregate(Currency::Usd, &january(), &lines).unwrap();
        assert_eq!(totals.line_count, 2);
        assert_eq!(totals.total, Money::new(17_250));
    }

    #[test]
    fn test_batch_lifecycle_shape() {
        let totals = BatchTotals::aggregate(
            Currency::Usd,
            &january(),
            &[line(1, 4_500, at(2026, 1, 3))],
        )
        .unwrap();
        let mut batch =
            VerifierPayoutBatch::new(PayoutBatchId(9), VerifierId(5), january(), totals, at(2026, 2, 1));
        let reference = batch.begin_payout(PayoutMethod::Manual, at(2026, 2, 1)).unwrap();
        assert!(reference.starts_with("VPB-000009-1-"));
        assert_eq!(batch.status, PayoutBatchStatus::Processing);
        batch.mark_paid(at(2026, 2, 2)).unwrap();
        assert_eq!(batch.status, PayoutBatchStatus::Paid);
        assert!(batch.mark_failed("late".into()).is_err());
    }

    #[test]
    fn test_empty_batch_cannot_be_paid() {
        let totals = BatchTotals::aggregate(Currency::Usd, &january(), &[]).unwrap();
        let mut batch =
            VerifierPayoutBatch::new(PayoutBatchId(1), VerifierId(5), january(), totals, at(2026, 2, 1));
        assert!(matches!(
            batch.begin_payout(PayoutMethod::BankTransfer, at(2026, 2, 1)),
            Err(EngineError::NonPositivePayout(0))
        ));
    }
}
