use crate::application::payout::PayoutDriver;
use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::ids::{PayoutBatchId, VerifierId};
use crate::domain::money::Currency;
use crate::domain::payout::{Payee, PayoutMethod, Period, TransferStatus};
use crate::domain::ports::{ClockRef, VerifierPayoutStoreRef};
use crate::domain::verification::{VerificationRequest, VerificationStatus};
use crate::domain::verifier_payout::{BatchTotals, VerifierPayout, VerifierPayoutBatch};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

/// Verifier earnings: one line per approved verification, paid out in
/// per-period batches that follow the same lifecycle as seller settlements.
#[derive(Clone)]
pub struct VerifierPayoutLedger {
    store: VerifierPayoutStoreRef,
    driver: PayoutDriver,
    clock: ClockRef,
    currency: Currency,
}

impl VerifierPayoutLedger {
    pub fn new(
        store: VerifierPayoutStoreRef,
        driver: PayoutDriver,
        clock: ClockRef,
        currency: Currency,
    ) -> Self {
        Self {
            store,
            driver,
            clock,
            currency,
        }
    }

    async fn load(&self, id: PayoutBatchId) -> Result<VerifierPayoutBatch> {
        self.store
            .get_batch(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("verifier payout batch {id}")))
    }

    /// Records the verifier's share of an approved request.
    ///
    /// Idempotent: a second call for the same request returns `None`. Requests
    /// without a bound verifier or with a zero share produce no line.
    pub async fn record_earning(
        &self,
        request: &VerificationRequest,
    ) -> Result<Outcome<Option<VerifierPayout>>> {
        if request.status != VerificationStatus::Approved {
            return Err(EngineError::InvalidTransition {
                entity: "verification",
                id: request.id.to_string(),
                status: request.status.to_string(),
                action: "record verifier earnings",
            });
        }
        let Some(verifier) = request.verifier else {
            return Ok(Outcome::new(None));
        };
        if !request.verifier_share.is_positive() {
            return Ok(Outcome::new(None));
        }

        let line = VerifierPayout {
            verifier,
            verification: request.id,
            amount: request.verifier_share,
            currency: request.currency,
            created_at: request.completed_at.unwrap_or_else(|| self.clock.now()),
        };
        if !self.store.insert_line_if_absent(line.clone()).await? {
            return Ok(Outcome::new(None));
        }
        info!(%verifier, request = %request.id, amount = %line.amount, "verifier earning recorded");
        let event = DomainEvent::VerifierEarningRecorded {
            verifier,
            request: request.id,
            amount: line.amount,
        };
        Ok(Outcome::new(Some(line)).with_event(event))
    }

    pub async fn lines(&self, verifier: VerifierId, period: &Period) -> Result<Vec<VerifierPayout>> {
        self.store.lines_for_verifier(verifier, period).await
    }

    pub async fn calculate_batch(
        &self,
        verifier: VerifierId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<VerifierPayoutBatch> {
        let period = Period::new(start, end)?;
        let lines = self.store.lines_for_verifier(verifier, &period).await?;
        let totals = BatchTotals::aggregate(self.currency, &period, &lines)?;
        let id = self.store.next_batch_id().await?;
        let batch = VerifierPayoutBatch::new(id, verifier, period, totals, self.clock.now());
        if !self.store.insert_batch_if_no_overlap(batch.clone()).await? {
            return Err(EngineError::OverlappingPeriod(Payee::Verifier(verifier)));
        }
        info!(batch = %id, %verifier, %period, total = %batch.totals.total, lines = batch.totals.line_count, "verifier batch calculated");
        Ok(batch)
    }

    pub async fn process_batch_payout(
        &self,
        id: PayoutBatchId,
        method: PayoutMethod,
    ) -> Result<Outcome<VerifierPayoutBatch>> {
        let batch = self.load(id).await?;
        self.driver.submit(&self.store, batch, method).await
    }

    pub async fn mark_batch_as_paid(
        &self,
        id: PayoutBatchId,
        payout_date: DateTime<Utc>,
    ) -> Result<Outcome<VerifierPayoutBatch>> {
        let batch = self.load(id).await?;
        self.driver.mark_paid(&self.store, batch, payout_date).await
    }

    pub async fn mark_batch_as_failed(
        &self,
        id: PayoutBatchId,
        reason: String,
    ) -> Result<Outcome<VerifierPayoutBatch>> {
        let batch = self.load(id).await?;
        self.driver.mark_failed(&self.store, batch, reason).await
    }

    pub async fn apply_transfer_status(
        &self,
        reference: &str,
        status: TransferStatus,
    ) -> Result<Outcome<VerifierPayoutBatch>> {
        let batch = self
            .store
            .find_batch_by_reference(reference)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payout reference {reference}")))?;
        self.driver.apply_status(&self.store, batch, status).await
    }

    /// Month-to-date earnings. Nothing is persisted.
    pub async fn get_current_month_estimate(&self, verifier: VerifierId) -> Result<BatchTotals> {
        let period = Period::month_to_date(self.clock.now().date_naive());
        let lines = self.store.lines_for_verifier(verifier, &period).await?;
        BatchTotals::aggregate(self.currency, &period, &lines)
    }

    pub async fn batches(&self, verifier: VerifierId) -> Result<Vec<VerifierPayoutBatch>> {
        self.store.batches_for_verifier(verifier).await
    }
}
