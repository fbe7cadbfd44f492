use crate::application::payout::PayoutDriver;
use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::ids::{SellerId, SettlementId};
use crate::domain::money::{Currency, Money};
use crate::domain::payout::{Payee, PayoutMethod, Period, TransferStatus};
use crate::domain::ports::{ClockRef, OrderLedgerRef, SettlementStoreRef};
use crate::domain::settlement::{Settlement, SettlementStatus, SettlementTotals};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

/// Count and summed net payout of settlements in one status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub count: u32,
    pub net_payout: Money,
}

impl StatusSummary {
    fn add(&mut self, settlement: &Settlement) -> Result<()> {
        self.count += 1;
        self.net_payout = self.net_payout.checked_add(settlement.totals.net_payout)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementStatistics {
    pub pending: StatusSummary,
    pub processing: StatusSummary,
    pub paid: StatusSummary,
    pub failed: StatusSummary,
    pub gross_sales: Money,
    pub platform_fee: Money,
    pub refunds: Money,
}

/// Computes seller settlements from order data and pays them out.
#[derive(Clone)]
pub struct SettlementEngine {
    settlements: SettlementStoreRef,
    orders: OrderLedgerRef,
    driver: PayoutDriver,
    clock: ClockRef,
    currency: Currency,
}

impl SettlementEngine {
    pub fn new(
        settlements: SettlementStoreRef,
        orders: OrderLedgerRef,
        driver: PayoutDriver,
        clock: ClockRef,
        currency: Currency,
    ) -> Self {
        Self {
            settlements,
            orders,
            driver,
            clock,
            currency,
        }
    }

    async fn load(&self, id: SettlementId) -> Result<Settlement> {
        self.settlements
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("settlement {id}")))
    }

    async fn totals(&self, seller: SellerId, period: &Period) -> Result<SettlementTotals> {
        let orders = self.orders.orders_for_seller(seller, period).await?;
        let refunds = self.orders.refunds_for_seller(seller, period).await?;
        SettlementTotals::aggregate(self.currency, period, &orders, &refunds)
    }

    /// Aggregates the seller's orders and refunds in `start..=end` into a new
    /// `PENDING` settlement. Periods may not overlap an existing settlement of
    /// the same seller, so repeating a calculation fails instead of paying twice.
    pub async fn calculate_settlement(
        &self,
        seller: SellerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Outcome<Settlement>> {
        let period = Period::new(start, end)?;
        let totals = self.totals(seller, &period).await?;
        let id = self.settlements.next_id().await?;
        let settlement = Settlement::new(id, seller, period, totals, self.clock.now());
        if !self.settlements.insert_if_no_overlap(settlement.clone()).await? {
            return Err(EngineError::OverlappingPeriod(Payee::Seller(seller)));
        }
        info!(
            settlement = %id,
            %seller,
            %period,
            gross = %settlement.totals.gross_sales,
            net = %settlement.totals.net_payout,
            "settlement calculated"
        );
        let event = DomainEvent::SettlementReady {
            settlement: id,
            seller,
            net_payout: settlement.totals.net_payout,
        };
        Ok(Outcome::new(settlement).with_event(event))
    }

    /// Settles every seller with order activity in the ledger.
    pub async fn calculate_all(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Outcome<Settlement>>> {
        let mut settled = Vec::new();
        for seller in self.orders.sellers().await? {
            settled.push(self.calculate_settlement(seller, start, end).await?);
        }
        Ok(settled)
    }

    pub async fn process_settlement_payout(
        &self,
        id: SettlementId,
        method: PayoutMethod,
    ) -> Result<Outcome<Settlement>> {
        let settlement = self.load(id).await?;
        self.driver.submit(&self.settlements, settlement, method).await
    }

    pub async fn mark_settlement_as_paid(
        &self,
        id: SettlementId,
        payout_date: DateTime<Utc>,
    ) -> Result<Outcome<Settlement>> {
        let settlement = self.load(id).await?;
        self.driver
            .mark_paid(&self.settlements, settlement, payout_date)
            .await
    }

    pub async fn mark_settlement_as_failed(
        &self,
        id: SettlementId,
        reason: String,
    ) -> Result<Outcome<Settlement>> {
        let settlement = self.load(id).await?;
        self.driver
            .mark_failed(&self.settlements, settlement, reason)
            .await
    }

    /// Routes a provider callback to the settlement that issued `reference`.
    pub async fn apply_transfer_status(
        &self,
        reference: &str,
        status: TransferStatus,
    ) -> Result<Outcome<Settlement>> {
        let settlement = self
            .settlements
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payout reference {reference}")))?;
        self.driver
            .apply_status(&self.settlements, settlement, status)
            .await
    }

    /// First-of-month through today, aggregated exactly like a settlement but
    /// never stored.
    pub async fn get_current_month_estimate(&self, seller: SellerId) -> Result<SettlementTotals> {
        let period = Period::month_to_date(self.clock.now().date_naive());
        self.totals(seller, &period).await
    }

    pub async fn get(&self, id: SettlementId) -> Result<Settlement> {
        self.load(id).await
    }

    pub async fn for_seller(&self, seller: SellerId) -> Result<Vec<Settlement>> {
        self.settlements.for_seller(seller).await
    }

    pub async fn statistics(&self) -> Result<SettlementStatistics> {
        let mut stats = SettlementStatistics::default();
        for settlement in self.settlements.all().await? {
            match settlement.status {
                SettlementStatus::Pending => stats.pending.add(&settlement)?,
                SettlementStatus::Processing => stats.processing.add(&settlement)?,
                SettlementStatus::Paid => stats.paid.add(&settlement)?,
                SettlementStatus::Failed => stats.failed.add(&settlement)?,
            }
            let totals = &settlement.totals;
            stats.gross_sales = stats.gross_sales.checked_add(totals.gross_sales)?;
            stats.platform_fee = stats.platform_fee.checked_add(totals.platform_fee)?;
            stats.refunds = stats.refunds.checked_add(totals.refunds)?;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payout::{PayoutDestination, PayoutLifecycle, TransferRequest};
    use crate::domain::ports::{OrderLedger, PaymentProvider};
    use crate::domain::settlement::OrderStatus;
    use crate::domain::settlement::tests::{at, order, refund};
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::in_memory::{
        InMemoryOrderLedger, InMemorySettlementStore, StaticPayeeDirectory,
    };
    use crate::infrastructure::provider::SimulatedPaymentProvider;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct Fixture {
        engine: SettlementEngine,
        provider: SimulatedPaymentProvider,
        payees: StaticPayeeDirectory,
    }

    fn full_destination() -> PayoutDestination {
        PayoutDestination {
            holder_name: Some("Ada Seller".into()),
            account_number: Some("0012345".into()),
            institution: Some("First Bank".into()),
        }
    }

    async fn fixture() -> Fixture {
        let ledger = InMemoryOrderLedger::new();
        ledger
            .record_order(order(1, 60_000, 6_000, OrderStatus::Paid, at(2026, 1, 5)))
            .await
            .unwrap();
        ledger
            .record_order(order(2, 40_000, 4_000, OrderStatus::Completed, at(2026, 1, 20)))
            .await
            .unwrap();
        ledger
            .record_refund(refund(1, 20_000, at(2026, 1, 25)))
            .await
            .unwrap();

        let provider = SimulatedPaymentProvider::new();
        let payees = StaticPayeeDirectory::new();
        let clock: ClockRef = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 28, 12, 0, 0).unwrap(),
        ));
        let driver = PayoutDriver::new(
            Arc::new(provider.clone()),
            Arc::new(payees.clone()),
            clock.clone(),
        );
        let engine = SettlementEngine::new(
            Arc::new(InMemorySettlementStore::new()),
            Arc::new(ledger),
            driver,
            clock,
            Currency::Usd,
        );
        Fixture {
            engine,
            provider,
            payees,
        }
    }

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_calculate_and_repeat() {
        let f = fixture().await;
        let outcome = f
            .engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap();
        assert_eq!(outcome.value.totals.net_payout, Money::new(70_000));
        assert_eq!(outcome.value.status, SettlementStatus::Pending);
        assert_eq!(outcome.events.len(), 1);

        assert!(matches!(
            f.engine
                .calculate_settlement(SellerId(1), jan(1), jan(31))
                .await,
            Err(EngineError::OverlappingPeriod(Payee::Seller(SellerId(1))))
        ));
        assert!(matches!(
            f.engine
                .calculate_settlement(SellerId(1), jan(31), jan(31))
                .await,
            Err(EngineError::OverlappingPeriod(_))
        ));
        assert_eq!(f.engine.for_seller(SellerId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inverted_period_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.engine
                .calculate_settlement(SellerId(1), jan(10), jan(1))
                .await,
            Err(EngineError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_payout_requires_complete_destination() {
        let f = fixture().await;
        let settlement = f
            .engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap()
            .value;

        f.payees
            .insert(
                Payee::Seller(SellerId(1)),
                PayoutDestination {
                    institution: None,
                    ..full_destination()
                },
            )
            .await;
        assert!(matches!(
            f.engine
                .process_settlement_payout(settlement.id, PayoutMethod::BankTransfer)
                .await,
            Err(EngineError::IncompletePayoutDestination(missing)) if missing == "institution"
        ));
        assert_eq!(
            f.engine.get(settlement.id).await.unwrap().status,
            SettlementStatus::Pending
        );

        f.payees
            .insert(Payee::Seller(SellerId(1)), full_destination())
            .await;
        let outcome = f
            .engine
            .process_settlement_payout(settlement.id, PayoutMethod::BankTransfer)
            .await
            .unwrap();
        assert_eq!(outcome.value.status, SettlementStatus::Processing);
        assert_eq!(outcome.value.payout.provider_reference.as_deref(), Some("SIM-00000001"));
        assert_eq!(f.provider.submitted().await[0].amount, Money::new(70_000));
    }

    #[tokio::test]
    async fn test_provider_failure_then_retry() {
        let f = fixture().await;
        f.payees
            .insert(Payee::Seller(SellerId(1)), full_destination())
            .await;
        let id = f
            .engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap()
            .value
            .id;

        f.provider.set_declining(true);
        let failed = f
            .engine
            .process_settlement_payout(id, PayoutMethod::BankTransfer)
            .await
            .unwrap();
        assert_eq!(failed.value.status, SettlementStatus::Failed);
        assert!(failed.value.payout.failure_reason.is_some());
        assert!(matches!(failed.events[0], DomainEvent::PayoutFailed { .. }));

        f.provider.set_declining(false);
        let retried = f
            .engine
            .process_settlement_payout(id, PayoutMethod::BankTransfer)
            .await
            .unwrap();
        assert_eq!(retried.value.status, SettlementStatus::Processing);
        assert_eq!(retried.value.payout.attempts, 2);

        let paid = f
            .engine
            .mark_settlement_as_paid(id, at(2026, 2, 2))
            .await
            .unwrap();
        assert_eq!(paid.value.status, SettlementStatus::Paid);
        assert!(
            f.engine
                .mark_settlement_as_failed(id, "late bounce".into())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_manual_payout_skips_provider() {
        let f = fixture().await;
        f.payees
            .insert(Payee::Seller(SellerId(1)), full_destination())
            .await;
        let id = f
            .engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap()
            .value
            .id;
        let outcome = f
            .engine
            .process_settlement_payout(id, PayoutMethod::Manual)
            .await
            .unwrap();
        assert_eq!(outcome.value.status, SettlementStatus::Processing);
        assert!(f.provider.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_callback_routing() {
        let f = fixture().await;
        f.payees
            .insert(Payee::Seller(SellerId(1)), full_destination())
            .await;
        let id = f
            .engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap()
            .value
            .id;
        let reference = f
            .engine
            .process_settlement_payout(id, PayoutMethod::BankTransfer)
            .await
            .unwrap()
            .value
            .payout
            .transaction_reference
            .unwrap();

        let failed = f
            .engine
            .apply_transfer_status(
                &reference,
                TransferStatus::Failed {
                    reason: "account closed".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.value.status, SettlementStatus::Failed);
        assert!(matches!(
            f.engine
                .apply_transfer_status("STL-999999-1-20260101000000", TransferStatus::Failed {
                    reason: "x".into()
                })
                .await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_estimate_matches_settlement() {
        let f = fixture().await;
        let estimate = f
            .engine
            .get_current_month_estimate(SellerId(1))
            .await
            .unwrap();
        assert_eq!(estimate.net_payout, Money::new(70_000));
        assert!(f.engine.for_seller(SellerId(1)).await.unwrap().is_empty());

        let settled = f
            .engine
            .calculate_settlement(SellerId(1), jan(1), jan(28))
            .await
            .unwrap();
        assert_eq!(settled.value.totals, estimate);
    }

    #[tokio::test]
    async fn test_statistics() {
        let f = fixture().await;
        f.engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap();
        f.engine
            .calculate_settlement(SellerId(2), jan(1), jan(31))
            .await
            .unwrap();
        let stats = f.engine.statistics().await.unwrap();
        assert_eq!(stats.pending.count, 2);
        assert_eq!(stats.pending.net_payout, Money::new(70_000));
        assert_eq!(stats.gross_sales, Money::new(100_000));
        assert_eq!(stats.paid, StatusSummary::default());
    }

    /// Delivers the success callback before answering the transfer call.
    struct EagerCallbackProvider {
        settlements: SettlementStoreRef,
    }

    #[async_trait]
    impl PaymentProvider for EagerCallbackProvider {
        async fn initiate_transfer(&self, request: &TransferRequest) -> Result<String> {
            let mut settlement = self
                .settlements
                .find_by_reference(&request.reference)
                .await?
                .ok_or_else(|| EngineError::NotFound(request.reference.clone()))?;
            settlement.mark_paid(at(2026, 1, 29))?;
            assert!(self.settlements.replace(settlement).await?);
            Ok("FAST-00000001".into())
        }
    }

    #[tokio::test]
    async fn test_callback_during_submit_is_kept() {
        let ledger = InMemoryOrderLedger::new();
        ledger
            .record_order(order(1, 60_000, 6_000, OrderStatus::Paid, at(2026, 1, 5)))
            .await
            .unwrap();
        let settlements: SettlementStoreRef = Arc::new(InMemorySettlementStore::new());
        let payees = StaticPayeeDirectory::new();
        payees
            .insert(Payee::Seller(SellerId(1)), full_destination())
            .await;
        let clock: ClockRef = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 28, 12, 0, 0).unwrap(),
        ));
        let provider = EagerCallbackProvider {
            settlements: settlements.clone(),
        };
        let driver = PayoutDriver::new(Arc::new(provider), Arc::new(payees), clock.clone());
        let engine = SettlementEngine::new(
            settlements,
            Arc::new(ledger),
            driver,
            clock,
            Currency::Usd,
        );
        let id = engine
            .calculate_settlement(SellerId(1), jan(1), jan(31))
            .await
            .unwrap()
            .value
            .id;

        let outcome = engine
            .process_settlement_payout(id, PayoutMethod::BankTransfer)
            .await
            .unwrap();
        assert_eq!(outcome.value.status, SettlementStatus::Paid);
        assert_eq!(
            outcome.value.payout.provider_reference.as_deref(),
            Some("FAST-00000001")
        );
        assert!(matches!(outcome.events[0], DomainEvent::PayoutSubmitted { .. }));

        let stored = engine.get(id).await.unwrap();
        assert_eq!(stored, outcome.value);
    }
}
