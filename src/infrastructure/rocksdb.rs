use crate::domain::ids::{
    ExpertReviewId, PayoutBatchId, SellerId, SettlementId, VerificationId, VerifierId,
};
use crate::domain::panel::{ExpertReview, ExpertReviewStatus};
use crate::domain::payout::Period;
use crate::domain::ports::{
    ExpertReviewStore, OrderLedger, SettlementStore, VerificationFilter, VerificationStore,
    VerifierPayoutStore,
};
use crate::domain::settlement::{OrderRecord, RefundRecord, Settlement};
use crate::domain::verification::VerificationRequest;
use crate::domain::verifier_payout::{VerifierPayout, VerifierPayoutBatch};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_VERIFICATIONS: &str = "verifications";
pub const CF_EXPERT_REVIEWS: &str = "expert_reviews";
pub const CF_SETTLEMENTS: &str = "settlements";
pub const CF_ORDERS: &str = "orders";
pub const CF_REFUNDS: &str = "refunds";
pub const CF_PAYOUT_LINES: &str = "payout_lines";
pub const CF_PAYOUT_BATCHES: &str = "payout_batches";
/// Id sequences, one key per entity kind.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 8] = [
    CF_VERIFICATIONS,
    CF_EXPERT_REVIEWS,
    CF_SETTLEMENTS,
    CF_ORDERS,
    CF_REFUNDS,
    CF_PAYOUT_LINES,
    CF_PAYOUT_BATCHES,
    CF_META,
];

/// A persistent store backed by RocksDB, one column family per record kind.
///
/// Values are JSON. Every read-check-write sequence (conditional replace,
/// overlap and uniqueness guards, id sequences) runs under `write_lock`, so
/// the store gives the same atomicity guarantees as the in-memory adapters
/// within one process.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn codec_error(e: serde_json::Error) -> EngineError {
    EngineError::InternalError(Box::new(e))
}

impl RocksDbStore {
    /// Opens or creates a database at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EngineError::InternalError(Box::new(std::io::Error::other(format!(
                "column family '{name}' not found"
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf: &str, key: u64, value: &T) -> Result<()> {
        let handle = self.handle(cf)?;
        let bytes = serde_json::to_vec(value).map_err(codec_error)?;
        self.db.put_cf(handle, key.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, cf: &str, key: u64) -> Result<Option<T>> {
        let handle = self.handle(cf)?;
        match self.db.get_pinned_cf(handle, key.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(codec_error)?)),
            None => Ok(None),
        }
    }

    /// Every value in `cf`, in key order.
    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = self.handle(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value).map_err(codec_error)?);
        }
        Ok(values)
    }

    async fn next_sequence(&self, name: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let handle = self.handle(CF_META)?;
        let current = match self.db.get_pinned_cf(handle, name.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    EngineError::InternalError(Box::new(std::io::Error::other(format!(
                        "corrupt sequence '{name}'"
                    ))))
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(handle, name.as_bytes(), next.to_be_bytes())?;
        Ok(next)
    }

    /// Stores `value` if the stored copy's version matches `version`.
    async fn compare_and_put<T>(
        &self,
        cf: &str,
        key: u64,
        version: impl Fn(&T) -> u64,
        mut value: T,
        bump: impl FnOnce(&mut T),
    ) -> Result<bool>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let _guard = self.write_lock.lock().await;
        match self.fetch::<T>(cf, key)? {
            Some(current) if version(&current) == version(&value) => {
                bump(&mut value);
                self.put(cf, key, &value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl VerificationStore for RocksDbStore {
    async fn next_id(&self) -> Result<VerificationId> {
        Ok(VerificationId(self.next_sequence(CF_VERIFICATIONS).await?))
    }

    async fn insert_if_no_active(&self, request: VerificationRequest) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<VerificationRequest> = self.scan(CF_VERIFICATIONS)?;
        if existing
            .iter()
            .any(|r| r.product == request.product && r.is_active())
        {
            return Ok(false);
        }
        self.put(CF_VERIFICATIONS, request.id.0, &request)?;
        Ok(true)
    }

    async fn get(&self, id: VerificationId) -> Result<Option<VerificationRequest>> {
        self.fetch(CF_VERIFICATIONS, id.0)
    }

    async fn replace(&self, request: VerificationRequest) -> Result<bool> {
        let key = request.id.0;
        self.compare_and_put(
            CF_VERIFICATIONS,
            key,
            |r: &VerificationRequest| r.version,
            request,
            |r| r.version += 1,
        )
        .await
    }

    async fn list(&self, filter: &VerificationFilter) -> Result<Vec<VerificationRequest>> {
        let all: Vec<VerificationRequest> = self.scan(CF_VERIFICATIONS)?;
        Ok(all.into_iter().filter(|r| filter.matches(r)).collect())
    }
}

#[async_trait]
impl ExpertReviewStore for RocksDbStore {
    async fn next_id(&self) -> Result<ExpertReviewId> {
        Ok(ExpertReviewId(self.next_sequence(CF_EXPERT_REVIEWS).await?))
    }

    async fn insert(&self, review: ExpertReview) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put(CF_EXPERT_REVIEWS, review.id.0, &review)
    }

    async fn get(&self, id: ExpertReviewId) -> Result<Option<ExpertReview>> {
        self.fetch(CF_EXPERT_REVIEWS, id.0)
    }

    async fn replace(&self, review: ExpertReview) -> Result<bool> {
        let key = review.id.0;
        self.compare_and_put(
            CF_EXPERT_REVIEWS,
            key,
            |r: &ExpertReview| r.version,
            review,
            |r| r.version += 1,
        )
        .await
    }

    async fn for_request(&self, request: VerificationId) -> Result<Vec<ExpertReview>> {
        let all: Vec<ExpertReview> = self.scan(CF_EXPERT_REVIEWS)?;
        Ok(all.into_iter().filter(|r| r.request == request).collect())
    }

    async fn with_status(&self, status: ExpertReviewStatus) -> Result<Vec<ExpertReview>> {
        let all: Vec<ExpertReview> = self.scan(CF_EXPERT_REVIEWS)?;
        Ok(all.into_iter().filter(|r| r.status == status).collect())
    }
}

#[async_trait]
impl SettlementStore for RocksDbStore {
    async fn next_id(&self) -> Result<SettlementId> {
        Ok(SettlementId(self.next_sequence(CF_SETTLEMENTS).await?))
    }

    async fn insert_if_no_overlap(&self, settlement: Settlement) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<Settlement> = self.scan(CF_SETTLEMENTS)?;
        if existing
            .iter()
            .any(|s| s.seller == settlement.seller && s.period.overlaps(&settlement.period))
        {
            return Ok(false);
        }
        self.put(CF_SETTLEMENTS, settlement.id.0, &settlement)?;
        Ok(true)
    }

    async fn get(&self, id: SettlementId) -> Result<Option<Settlement>> {
        self.fetch(CF_SETTLEMENTS, id.0)
    }

    async fn replace(&self, settlement: Settlement) -> Result<bool> {
        let key = settlement.id.0;
        self.compare_and_put(
            CF_SETTLEMENTS,
            key,
            |s: &Settlement| s.version,
            settlement,
            |s| s.version += 1,
        )
        .await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Settlement>> {
        let all: Vec<Settlement> = self.scan(CF_SETTLEMENTS)?;
        Ok(all
            .into_iter()
            .find(|s| s.payout.transaction_reference.as_deref() == Some(reference)))
    }

    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Settlement>> {
        let all: Vec<Settlement> = self.scan(CF_SETTLEMENTS)?;
        let mut matching: Vec<_> = all.into_iter().filter(|s| s.seller == seller).collect();
        matching.sort_by_key(|s| s.period.start);
        Ok(matching)
    }

    async fn all(&self) -> Result<Vec<Settlement>> {
        self.scan(CF_SETTLEMENTS)
    }
}

#[async_trait]
impl OrderLedger for RocksDbStore {
    async fn record_order(&self, order: OrderRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put(CF_ORDERS, order.order.0, &order)
    }

    async fn record_refund(&self, refund: RefundRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let handle = self.handle(CF_REFUNDS)?;
        let bytes = serde_json::to_vec(&refund).map_err(codec_error)?;
        self.db.put_cf(handle, refund.key().to_bytes(), bytes)?;
        Ok(())
    }

    async fn orders_for_seller(&self, seller: SellerId, period: &Period) -> Result<Vec<OrderRecord>> {
        let all: Vec<OrderRecord> = self.scan(CF_ORDERS)?;
        Ok(all
            .into_iter()
            .filter(|o| o.seller == seller && period.contains(o.paid_at))
            .collect())
    }

    async fn refunds_for_seller(
        &self,
        seller: SellerId,
        period: &Period,
    ) -> Result<Vec<RefundRecord>> {
        let all: Vec<RefundRecord> = self.scan(CF_REFUNDS)?;
        Ok(all
            .into_iter()
            .filter(|r| r.seller == seller && period.contains(r.refunded_at))
            .collect())
    }

    async fn sellers(&self) -> Result<Vec<SellerId>> {
        let orders: Vec<OrderRecord> = self.scan(CF_ORDERS)?;
        let refunds: Vec<RefundRecord> = self.scan(CF_REFUNDS)?;
        let sellers: BTreeSet<SellerId> = orders
            .iter()
            .map(|o| o.seller)
            .chain(refunds.iter().map(|r| r.seller))
            .collect();
        Ok(sellers.into_iter().collect())
    }
}

#[async_trait]
impl VerifierPayoutStore for RocksDbStore {
    async fn insert_line_if_absent(&self, line: VerifierPayout) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if self
            .fetch::<VerifierPayout>(CF_PAYOUT_LINES, line.verification.0)?
            .is_some()
        {
            return Ok(false);
        }
        self.put(CF_PAYOUT_LINES, line.verification.0, &line)?;
        Ok(true)
    }

    async fn line_for(&self, verification: VerificationId) -> Result<Option<VerifierPayout>> {
        self.fetch(CF_PAYOUT_LINES, verification.0)
    }

    async fn lines_for_verifier(
        &self,
        verifier: VerifierId,
        period: &Period,
    ) -> Result<Vec<VerifierPayout>> {
        let all: Vec<VerifierPayout> = self.scan(CF_PAYOUT_LINES)?;
        Ok(all
            .into_iter()
            .filter(|l| l.verifier == verifier && period.contains(l.created_at))
            .collect())
    }

    async fn next_batch_id(&self) -> Result<PayoutBatchId> {
        Ok(PayoutBatchId(self.next_sequence(CF_PAYOUT_BATCHES).await?))
    }

    async fn insert_batch_if_no_overlap(&self, batch: VerifierPayoutBatch) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<VerifierPayoutBatch> = self.scan(CF_PAYOUT_BATCHES)?;
        if existing
            .iter()
            .any(|b| b.verifier == batch.verifier && b.period.overlaps(&batch.period))
        {
            return Ok(false);
        }
        self.put(CF_PAYOUT_BATCHES, batch.id.0, &batch)?;
        Ok(true)
    }

    async fn get_batch(&self, id: PayoutBatchId) -> Result<Option<VerifierPayoutBatch>> {
        self.fetch(CF_PAYOUT_BATCHES, id.0)
    }

    async fn replace_batch(&self, batch: VerifierPayoutBatch) -> Result<bool> {
        let key = batch.id.0;
        self.compare_and_put(
            CF_PAYOUT_BATCHES,
            key,
            |b: &VerifierPayoutBatch| b.version,
            batch,
            |b| b.version += 1,
        )
        .await
    }

    async fn find_batch_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<VerifierPayoutBatch>> {
        let all: Vec<VerifierPayoutBatch> = self.scan(CF_PAYOUT_BATCHES)?;
        Ok(all
            .into_iter()
            .find(|b| b.payout.transaction_reference.as_deref() == Some(reference)))
    }

    async fn batches_for_verifier(&self, verifier: VerifierId) -> Result<Vec<VerifierPayoutBatch>> {
        let all: Vec<VerifierPayoutBatch> = self.scan(CF_PAYOUT_BATCHES)?;
        let mut matching: Vec<_> = all.into_iter().filter(|b| b.verifier == verifier).collect();
        matching.sort_by_key(|b| b.period.start);
        Ok(matching)
    }
}
