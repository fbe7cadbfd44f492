use crate::domain::fee::{FeeSchedule, VerificationLevel};
use crate::domain::ids::SellerId;
use crate::domain::payout::Period;
use crate::domain::settlement::{Settlement, SettlementTotals};
use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct SettlementRow<'a> {
    settlement: u64,
    seller: u64,
    period_start: String,
    period_end: String,
    orders: u32,
    refunds: u32,
    gross_sales: Decimal,
    platform_fee: Decimal,
    refund_total: Decimal,
    net_payout: Decimal,
    currency: &'a str,
    status: &'a str,
    reference: &'a str,
}

#[derive(Serialize)]
struct EstimateRow<'a> {
    seller: u64,
    period_start: String,
    period_end: String,
    orders: u32,
    gross_sales: Decimal,
    platform_fee: Decimal,
    refund_total: Decimal,
    net_payout: Decimal,
    currency: &'a str,
}

#[derive(Serialize)]
struct FeeRow<'a> {
    level: u8,
    fee: Decimal,
    platform: Decimal,
    verifier: Decimal,
    currency: &'a str,
}

/// Writes settlement, estimate and fee reports as CSV, amounts in major units.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_settlements<'a>(
        &mut self,
        settlements: impl IntoIterator<Item = &'a Settlement>,
    ) -> Result<()> {
        for s in settlements {
            let currency = s.totals.currency;
            self.writer.serialize(SettlementRow {
                settlement: s.id.0,
                seller: s.seller.0,
                period_start: s.period.start.to_string(),
                period_end: s.period.end.to_string(),
                orders: s.totals.order_count,
                refunds: s.totals.refund_count,
                gross_sales: s.totals.gross_sales.to_major(currency),
                platform_fee: s.totals.platform_fee.to_major(currency),
                refund_total: s.totals.refunds.to_major(currency),
                net_payout: s.totals.net_payout.to_major(currency),
                currency: currency.code(),
                status: s.status.as_str(),
                reference: s.payout.transaction_reference.as_deref().unwrap_or(""),
            })?;
        }
        self.flush()
    }

    pub fn write_estimate(
        &mut self,
        seller: SellerId,
        totals: &SettlementTotals,
        period: &Period,
    ) -> Result<()> {
        let currency = totals.currency;
        self.writer.serialize(EstimateRow {
            seller: seller.0,
            period_start: period.start.to_string(),
            period_end: period.end.to_string(),
            orders: totals.order_count,
            gross_sales: totals.gross_sales.to_major(currency),
            platform_fee: totals.platform_fee.to_major(currency),
            refund_total: totals.refunds.to_major(currency),
            net_payout: totals.net_payout.to_major(currency),
            currency: currency.code(),
        })?;
        self.flush()
    }

    pub fn write_fee_table(&mut self, schedule: &FeeSchedule) -> Result<()> {
        let currency = schedule.currency;
        for level in VerificationLevel::ALL {
            let split = schedule.quote(level)?;
            self.writer.serialize(FeeRow {
                level: level.value(),
                fee: split.fee.to_major(currency),
                platform: split.platform.to_major(currency),
                verifier: split.verifier.to_major(currency),
                currency: currency.code(),
            })?;
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(EngineError::from)
    }
}
