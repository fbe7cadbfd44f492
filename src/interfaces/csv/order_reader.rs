use crate::domain::fee::commission;
use crate::domain::ids::{OrderId, SellerId};
use crate::domain::money::{Currency, Money};
use crate::domain::settlement::{OrderRecord, OrderStatus, RefundRecord};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EntryKind {
    Sale,
    Refund,
}

/// One line of an order export, before conversion to minor units.
#[derive(Debug, Deserialize)]
struct OrderRow {
    #[serde(rename = "type")]
    kind: EntryKind,
    order: u64,
    seller: u64,
    amount: String,
    #[serde(default)]
    fee: Option<String>,
    #[serde(default)]
    status: Option<OrderStatus>,
    date: String,
}

/// A sale or refund imported into the order ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    Sale(OrderRecord),
    Refund(RefundRecord),
}

/// Reads sales and refunds from a CSV order export.
///
/// Amounts are major-unit decimals (`12.50`). A sale without a `fee` column
/// is charged the configured platform commission; a missing `status` means
/// the order completed. Dates are either `YYYY-MM-DD` or RFC 3339.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
    currency: Currency,
    commission_bps: u32,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R, currency: Currency, commission_bps: u32) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self {
            reader,
            currency,
            commission_bps,
        }
    }

    /// Lazily yields one entry per row; a bad row does not stop the stream.
    pub fn entries(self) -> impl Iterator<Item = Result<LedgerEntry>> {
        let currency = self.currency;
        let commission_bps = self.commission_bps;
        self.reader.into_deserialize().map(move |row| {
            let row: OrderRow = row.map_err(EngineError::from)?;
            convert(row, currency, commission_bps)
        })
    }
}

fn convert(row: OrderRow, currency: Currency, commission_bps: u32) -> Result<LedgerEntry> {
    let order = OrderId(row.order);
    let seller = SellerId(row.seller);
    let amount = parse_money(&row.amount, currency)?;
    if !amount.is_positive() {
        return Err(EngineError::validation(format!(
            "order {order}: amount must be positive"
        )));
    }
    let at = parse_timestamp(&row.date)?;

    match row.kind {
        EntryKind::Sale => {
            let platform_fee = match row.fee.as_deref().filter(|f| !f.is_empty()) {
                Some(fee) => parse_money(fee, currency)?,
                None => commission(amount, commission_bps)?,
            };
            if platform_fee.is_negative() || platform_fee > amount {
                return Err(EngineError::validation(format!(
                    "order {order}: fee {platform_fee} is outside 0..={amount}"
                )));
            }
            Ok(LedgerEntry::Sale(OrderRecord {
                order,
                seller,
                gross: amount,
                platform_fee,
                currency,
                status: row.status.unwrap_or(OrderStatus::Completed),
                paid_at: at,
            }))
        }
        EntryKind::Refund => Ok(LedgerEntry::Refund(RefundRecord {
            order,
            seller,
            amount,
            currency,
            refunded_at: at,
        })),
    }
}

fn parse_money(raw: &str, currency: Currency) -> Result<Money> {
    let value = Decimal::from_str(raw)
        .map_err(|e| EngineError::validation(format!("invalid amount '{raw}': {e}")))?;
    Money::from_major(value, currency)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|day| day.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| EngineError::validation(format!("invalid date '{raw}': {e}")))
}
