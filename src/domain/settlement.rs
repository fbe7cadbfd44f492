use crate::domain::ids::{OrderId, SellerId, SettlementId};
use crate::domain::money::{Currency, Money};
use crate::domain::payout::{Payee, PayoutLifecycle, PayoutProgress, PayoutTarget, Period};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Only money that actually changed hands is settled.
    pub fn is_settleable(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Completed)
    }
}

/// A sale as seen by the order collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order: OrderId,
    pub seller: SellerId,
    pub gross: Money,
    pub platform_fee: Money,
    pub currency: Currency,
    pub status: OrderStatus,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub order: OrderId,
    pub seller: SellerId,
    pub amount: Money,
    pub currency: Currency,
    pub refunded_at: DateTime<Utc>,
}

/// Identity of a refund across imports: the same order refunded by the same
/// amount at the same instant is one refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefundKey {
    pub order: OrderId,
    pub refunded_at_micros: i64,
    pub amount: Money,
}

impl RefundKey {
    /// Big-endian bytes, ordered by order then time then amount.
    pub fn to_bytes(self) -> [u8; 24] {
        let mut bytes = [0u8; 24];
        bytes[..8].copy_from_slice(&self.order.0.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.refunded_at_micros.to_be_bytes());
        bytes[16..].copy_from_slice(&self.amount.minor_units().to_be_bytes());
        bytes
    }
}

impl RefundRecord {
    pub fn key(&self) -> RefundKey {
        RefundKey {
            order: self.order,
            refunded_at_micros: self.refunded_at.timestamp_micros(),
            amount: self.amount,
        }
    }
}

/// Aggregated figures for one seller and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub order_count: u32,
    pub refund_count: u32,
    pub gross_sales: Money,
    pub platform_fee: Money,
    pub refunds: Money,
    /// `gross_sales - platform_fee - refunds`; negative means the seller owes.
    pub net_payout: Money,
    pub currency: Currency,
}

impl SettlementTotals {
    /// Sums settleable orders and refunds falling inside `period`.
    ///
    /// This is the single aggregation used by both real settlements and
    /// estimates, so the two always agree on the same data.
    pub fn aggregate(
        currency: Currency,
        period: &Period,
        orders: &[OrderRecord],
        refunds: &[RefundRecord],
    ) -> Result<Self> {
        let mut totals = SettlementTotals {
            order_count: 0,
            refund_count: 0,
            gross_sales: Money::ZERO,
            platform_fee: Money::ZERO,
            refunds: Money::ZERO,
            net_payout: Money::ZERO,
            currency,
        };

        // per-row net, kept wide so it cannot overflow
        let mut row_net: i128 = 0;
        for order in orders
            .iter()
            .filter(|o| o.status.is_settleable() && period.contains(o.paid_at))
        {
            if order.currency != currency {
                return Err(EngineError::CurrencyMismatch {
                    expected: currency,
                    found: order.currency,
                });
            }
            totals.order_count += 1;
            totals.gross_sales = totals.gross_sales.checked_add(order.gross)?;
            totals.platform_fee = totals.platform_fee.checked_add(order.platform_fee)?;
            row_net += i128::from(order.gross.minor_units())
                - i128::from(order.platform_fee.minor_units());
        }

        for refund in refunds.iter().filter(|r| period.contains(r.refunded_at)) {
            if refund.currency != currency {
                return Err(EngineError::CurrencyMismatch {
                    expected: currency,
                    found: refund.currency,
                });
            }
            totals.refund_count += 1;
            totals.refunds = totals.refunds.checked_add(refund.amount)?;
            row_net -= i128::from(refund.amount.minor_units());
        }

        totals.net_payout = totals
            .gross_sales
            .checked_sub(totals.platform_fee)?
            .checked_sub(totals.refunds)?;
        debug_assert_eq!(i128::from(totals.net_payout.minor_units()), row_net);
        Ok(totals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Processing => "PROCESSING",
            SettlementStatus::Paid => "PAID",
            SettlementStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One seller's payable period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub seller: SellerId,
    pub period: Period,
    #[serde(flatten)]
    pub totals: SettlementTotals,
    pub status: SettlementStatus,
    pub payout: PayoutProgress,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Settlement {
    pub fn new(
        id: SettlementId,
        seller: SellerId,
        period: Period,
        totals: SettlementTotals,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seller,
            period,
            totals,
            status: SettlementStatus::Pending,
            payout: PayoutProgress::default(),
            created_at: now,
            version: 0,
        }
    }
}

impl PayoutLifecycle for Settlement {
    type Status = SettlementStatus;

    const ENTITY: &'static str = "settlement";
    const REFERENCE_PREFIX: &'static str = "STL";
    const PENDING: SettlementStatus = SettlementStatus::Pending;
    const PROCESSING: SettlementStatus = SettlementStatus::Processing;
    const PAID: SettlementStatus = SettlementStatus::Paid;
    const FAILED: SettlementStatus = SettlementStatus::Failed;

    fn raw_id(&self) -> u64 {
        self.id.0
    }

    fn payee(&self) -> Payee {
        Payee::Seller(self.seller)
    }

    fn target(&self) -> PayoutTarget {
        PayoutTarget::Settlement(self.id)
    }

    fn amount(&self) -> Money {
        self.totals.net_payout
    }

    fn currency(&self) -> Currency {
        self.totals.currency
    }

    fn status(&self) -> SettlementStatus {
        self.status
    }

    fn set_status(&mut self, status: SettlementStatus) {
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
