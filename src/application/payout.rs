//! Payout execution shared by seller settlements and verifier batches.

use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::ids::{PayoutBatchId, SettlementId};
use crate::domain::payout::{
    PayoutLifecycle, PayoutMethod, TransferRequest, TransferStatus, validate_bank_account,
};
use crate::domain::ports::{
    ClockRef, PayeeDirectoryRef, PaymentProviderRef, SettlementStoreRef, VerifierPayoutStoreRef,
};
use crate::domain::settlement::Settlement;
use crate::domain::verifier_payout::VerifierPayoutBatch;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Conditional-write access to one kind of payout record.
#[async_trait]
pub trait PayoutRecordStore<E>: Send + Sync {
    async fn replace_record(&self, record: E) -> Result<bool>;
    async fn load_record(&self, id: u64) -> Result<Option<E>>;
}

#[async_trait]
impl PayoutRecordStore<Settlement> for SettlementStoreRef {
    async fn replace_record(&self, record: Settlement) -> Result<bool> {
        self.replace(record).await
    }

    async fn load_record(&self, id: u64) -> Result<Option<Settlement>> {
        self.get(SettlementId(id)).await
    }
}

#[async_trait]
impl PayoutRecordStore<VerifierPayoutBatch> for VerifierPayoutStoreRef {
    async fn replace_record(&self, record: VerifierPayoutBatch) -> Result<bool> {
        self.replace_batch(record).await
    }

    async fn load_record(&self, id: u64) -> Result<Option<VerifierPayoutBatch>> {
        self.get_batch(PayoutBatchId(id)).await
    }
}

/// Drives a [`PayoutLifecycle`] record through the provider.
#[derive(Clone)]
pub struct PayoutDriver {
    provider: PaymentProviderRef,
    payees: PayeeDirectoryRef,
    clock: ClockRef,
}

impl PayoutDriver {
    pub fn new(provider: PaymentProviderRef, payees: PayeeDirectoryRef, clock: ClockRef) -> Self {
        Self {
            provider,
            payees,
            clock,
        }
    }

    async fn commit<E, S>(&self, store: &S, mut record: E) -> Result<E>
    where
        E: PayoutLifecycle + Clone + Send + Sync + 'static,
        S: PayoutRecordStore<E> + ?Sized,
    {
        if !store.replace_record(record.clone()).await? {
            return Err(EngineError::ConcurrentModification(format!(
                "{} {}",
                E::ENTITY,
                record.raw_id()
            )));
        }
        *record.version_mut() += 1;
        Ok(record)
    }

    /// Moves `record` to `PROCESSING` and, for bank transfers, hands it to the
    /// provider. A provider error is not returned: the record is marked
    /// `FAILED` with the provider's message and a `PayoutFailed` event.
    ///
    /// The transfer is already accepted once the provider answers, so a
    /// callback that commits first wins: the stored record is returned as is,
    /// stamped with the provider reference when it still lacks one.
    pub async fn submit<E, S>(
        &self,
        store: &S,
        record: E,
        method: PayoutMethod,
    ) -> Result<Outcome<E>>
    where
        E: PayoutLifecycle + Clone + Send + Sync + 'static,
        S: PayoutRecordStore<E> + ?Sized,
    {
        let now = self.clock.now();
        let mut next = record;
        let reference = next.begin_payout(method, now)?;

        let destination = self
            .payees
            .destination(next.payee())
            .await?
            .unwrap_or_default();
        validate_bank_account(&destination)?;

        let mut next = self.commit(store, next).await?;
        info!(
            entity = E::ENTITY,
            id = next.raw_id(),
            %reference,
            ?method,
            amount = %next.amount(),
            "payout processing"
        );

        if method == PayoutMethod::Manual {
            let event = DomainEvent::PayoutSubmitted {
                target: next.target(),
                payee: next.payee(),
                reference,
            };
            return Ok(Outcome::new(next).with_event(event));
        }

        let transfer = TransferRequest {
            reference: reference.clone(),
            payee: next.payee(),
            amount: next.amount(),
            currency: next.currency(),
            destination,
        };
        match self.provider.initiate_transfer(&transfer).await {
            Ok(provider_reference) => {
                let id = next.raw_id();
                next.progress_mut().provider_reference = Some(provider_reference.clone());
                let next = match self.commit(store, next).await {
                    Ok(next) => next,
                    Err(EngineError::ConcurrentModification(_)) => {
                        info!(entity = E::ENTITY, id, %reference, "payout advanced by callback during submit");
                        self.reload_with_reference(store, id, provider_reference)
                            .await?
                    }
                    Err(e) => return Err(e),
                };
                let event = DomainEvent::PayoutSubmitted {
                    target: next.target(),
                    payee: next.payee(),
                    reference,
                };
                Ok(Outcome::new(next).with_event(event))
            }
            Err(e) => {
                warn!(entity = E::ENTITY, id = next.raw_id(), %reference, error = %e, "payout rejected by provider");
                let reason = e.to_string();
                next.mark_failed(reason.clone())?;
                let next = self.commit(store, next).await?;
                let event = DomainEvent::PayoutFailed {
                    target: next.target(),
                    payee: next.payee(),
                    reason,
                };
                Ok(Outcome::new(next).with_event(event))
            }
        }
    }

    async fn reload_with_reference<E, S>(
        &self,
        store: &S,
        id: u64,
        provider_reference: String,
    ) -> Result<E>
    where
        E: PayoutLifecycle + Clone + Send + Sync + 'static,
        S: PayoutRecordStore<E> + ?Sized,
    {
        let current = store
            .load_record(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("{} {id}", E::ENTITY)))?;
        if current.progress().provider_reference.is_some() {
            return Ok(current);
        }
        let mut stamped = current.clone();
        stamped.progress_mut().provider_reference = Some(provider_reference);
        match self.commit(store, stamped).await {
            Ok(stamped) => Ok(stamped),
            Err(EngineError::ConcurrentModification(_)) => Ok(store
                .load_record(id)
                .await?
                .unwrap_or(current)),
            Err(e) => Err(e),
        }
    }

    pub async fn mark_paid<E, S>(
        &self,
        store: &S,
        mut record: E,
        payout_date: DateTime<Utc>,
    ) -> Result<Outcome<E>>
    where
        E: PayoutLifecycle + Clone + Send + Sync + 'static,
        S: PayoutRecordStore<E> + ?Sized,
    {
        record.mark_paid(payout_date)?;
        let record = self.commit(store, record).await?;
        info!(entity = E::ENTITY, id = record.raw_id(), "payout paid");
        let event = DomainEvent::PayoutCompleted {
            target: record.target(),
            payee: record.payee(),
        };
        Ok(Outcome::new(record).with_event(event))
    }

    pub async fn mark_failed<E, S>(
        &self,
        store: &S,
        mut record: E,
        reason: String,
    ) -> Result<Outcome<E>>
    where
        E: PayoutLifecycle + Clone + Send + Sync + 'static,
        S: PayoutRecordStore<E> + ?Sized,
    {
        record.mark_failed(reason.clone())?;
        let record = self.commit(store, record).await?;
        warn!(entity = E::ENTITY, id = record.raw_id(), %reason, "payout failed");
        let event = DomainEvent::PayoutFailed {
            target: record.target(),
            payee: record.payee(),
            reason,
        };
        Ok(Outcome::new(record).with_event(event))
    }

    /// Applies a provider callback. A repeated success for a record that is
    /// already `PAID` is acknowledged without changes.
    pub async fn apply_status<E, S>(
        &self,
        store: &S,
        record: E,
        status: TransferStatus,
    ) -> Result<Outcome<E>>
    where
        E: PayoutLifecycle + Clone + Send + Sync + 'static,
        S: PayoutRecordStore<E> + ?Sized,
    {
        match status {
            TransferStatus::Succeeded { .. } if record.status() == E::PAID => {
                Ok(Outcome::new(record))
            }
            TransferStatus::Succeeded { paid_at } => self.mark_paid(store, record, paid_at).await,
            TransferStatus::Failed { reason } => self.mark_failed(store, record, reason).await,
        }
    }
}
