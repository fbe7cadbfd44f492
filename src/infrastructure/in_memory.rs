use crate::domain::event::DomainEvent;
use crate::domain::fee::VerificationLevel;
use crate::domain::ids::{
    ExpertReviewId, PayoutBatchId, ProductId, SellerId, SettlementId, VerificationId, VerifierId,
};
use crate::domain::panel::{ExpertReview, ExpertReviewStatus};
use crate::domain::payout::{Payee, PayoutDestination, Period};
use crate::domain::ports::{
    ExpertReviewStore, NotificationSink, OrderLedger, PayeeDirectory, ProductCatalog,
    ProductInfo, SettlementStore, VerificationFilter, VerificationStore, VerifierPayoutStore,
    VerifierProfile, VerifierRegistry,
};
use crate::domain::settlement::{OrderRecord, RefundRecord, Settlement};
use crate::domain::verification::VerificationRequest;
use crate::domain::verifier_payout::{VerifierPayout, VerifierPayoutBatch};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Monotonic id source starting at 1.
#[derive(Default, Clone)]
struct Sequence(Arc<AtomicU64>);

impl Sequence {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A thread-safe in-memory store for verification requests.
///
/// The write lock is held across the version check and the write, which is
/// what gives [`VerificationStore::replace`] its compare-and-set semantics.
#[derive(Default, Clone)]
pub struct InMemoryVerificationStore {
    requests: Arc<RwLock<HashMap<VerificationId, VerificationRequest>>>,
    ids: Sequence,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn next_id(&self) -> Result<VerificationId> {
        Ok(VerificationId(self.ids.next()))
    }

    async fn insert_if_no_active(&self, request: VerificationRequest) -> Result<bool> {
        let mut requests = self.requests.write().await;
        if requests
            .values()
            .any(|r| r.product == request.product && r.is_active())
        {
            return Ok(false);
        }
        requests.insert(request.id, request);
        Ok(true)
    }

    async fn get(&self, id: VerificationId) -> Result<Option<VerificationRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn replace(&self, mut request: VerificationRequest) -> Result<bool> {
        let mut requests = self.requests.write().await;
        match requests.get(&request.id) {
            Some(current) if current.version == request.version => {
                request.version += 1;
                requests.insert(request.id, request);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, filter: &VerificationFilter) -> Result<Vec<VerificationRequest>> {
        let requests = self.requests.read().await;
        let mut matching: Vec<_> = requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryExpertReviewStore {
    reviews: Arc<RwLock<HashMap<ExpertReviewId, ExpertReview>>>,
    ids: Sequence,
}

impl InMemoryExpertReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpertReviewStore for InMemoryExpertReviewStore {
    async fn next_id(&self) -> Result<ExpertReviewId> {
        Ok(ExpertReviewId(self.ids.next()))
    }

    async fn insert(&self, review: ExpertReview) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        reviews.insert(review.id, review);
        Ok(())
    }

    async fn get(&self, id: ExpertReviewId) -> Result<Option<ExpertReview>> {
        let reviews = self.reviews.read().await;
        Ok(reviews.get(&id).cloned())
    }

    async fn replace(&self, mut review: ExpertReview) -> Result<bool> {
        let mut reviews = self.reviews.write().await;
        match reviews.get(&review.id) {
            Some(current) if current.version == review.version => {
                review.version += 1;
                reviews.insert(review.id, review);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn for_request(&self, request: VerificationId) -> Result<Vec<ExpertReview>> {
        let reviews = self.reviews.read().await;
        let mut matching: Vec<_> = reviews
            .values()
            .filter(|r| r.request == request)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching)
    }

    async fn with_status(&self, status: ExpertReviewStatus) -> Result<Vec<ExpertReview>> {
        let reviews = self.reviews.read().await;
        let mut matching: Vec<_> = reviews
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching)
    }
}

#[derive(Default, Clone)]
pub struct InMemorySettlementStore {
    settlements: Arc<RwLock<HashMap<SettlementId, Settlement>>>,
    ids: Sequence,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlementStore {
    async fn next_id(&self) -> Result<SettlementId> {
        Ok(SettlementId(self.ids.next()))
    }

    async fn insert_if_no_overlap(&self, settlement: Settlement) -> Result<bool> {
        let mut settlements = self.settlements.write().await;
        if settlements
            .values()
            .any(|s| s.seller == settlement.seller && s.period.overlaps(&settlement.period))
        {
            return Ok(false);
        }
        settlements.insert(settlement.id, settlement);
        Ok(true)
    }

    async fn get(&self, id: SettlementId) -> Result<Option<Settlement>> {
        let settlements = self.settlements.read().await;
        Ok(settlements.get(&id).cloned())
    }

    async fn replace(&self, mut settlement: Settlement) -> Result<bool> {
        let mut settlements = self.settlements.write().await;
        match settlements.get(&settlement.id) {
            Some(current) if current.version == settlement.version => {
                settlement.version += 1;
                settlements.insert(settlement.id, settlement);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Settlement>> {
        let settlements = self.settlements.read().await;
        Ok(settlements
            .values()
            .find(|s| s.payout.transaction_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Settlement>> {
        let settlements = self.settlements.read().await;
        let mut matching: Vec<_> = settlements
            .values()
            .filter(|s| s.seller == seller)
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.period.start);
        Ok(matching)
    }

    async fn all(&self) -> Result<Vec<Settlement>> {
        let settlements = self.settlements.read().await;
        let mut all: Vec<_> = settlements.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOrderLedger {
    orders: Arc<RwLock<Vec<OrderRecord>>>,
    refunds: Arc<RwLock<Vec<RefundRecord>>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn record_order(&self, order: OrderRecord) -> Result<()> {
        let mut orders = self.orders.write().await;
        // a re-imported order replaces the earlier copy
        orders.retain(|o| o.order != order.order);
        orders.push(order);
        Ok(())
    }

    async fn record_refund(&self, refund: RefundRecord) -> Result<()> {
        let mut refunds = self.refunds.write().await;
        // a re-imported refund replaces the earlier copy
        let key = refund.key();
        refunds.retain(|r| r.key() != key);
        refunds.push(refund);
        Ok(())
    }

    async fn orders_for_seller(&self, seller: SellerId, period: &Period) -> Result<Vec<OrderRecord>> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| o.seller == seller && period.contains(o.paid_at))
            .cloned()
            .collect())
    }

    async fn refunds_for_seller(
        &self,
        seller: SellerId,
        period: &Period,
    ) -> Result<Vec<RefundRecord>> {
        let refunds = self.refunds.read().await;
        Ok(refunds
            .iter()
            .filter(|r| r.seller == seller && period.contains(r.refunded_at))
            .cloned()
            .collect())
    }

    async fn sellers(&self) -> Result<Vec<SellerId>> {
        let orders = self.orders.read().await;
        let refunds = self.refunds.read().await;
        let sellers: BTreeSet<SellerId> = orders
            .iter()
            .map(|o| o.seller)
            .chain(refunds.iter().map(|r| r.seller))
            .collect();
        Ok(sellers.into_iter().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryVerifierPayoutStore {
    lines: Arc<RwLock<HashMap<VerificationId, VerifierPayout>>>,
    batches: Arc<RwLock<HashMap<PayoutBatchId, VerifierPayoutBatch>>>,
    ids: Sequence,
}

impl InMemoryVerifierPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerifierPayoutStore for InMemoryVerifierPayoutStore {
    async fn insert_line_if_absent(&self, line: VerifierPayout) -> Result<bool> {
        let mut lines = self.lines.write().await;
        if lines.contains_key(&line.verification) {
            return Ok(false);
        }
        lines.insert(line.verification, line);
        Ok(true)
    }

    async fn line_for(&self, verification: VerificationId) -> Result<Option<VerifierPayout>> {
        let lines = self.lines.read().await;
        Ok(lines.get(&verification).cloned())
    }

    async fn lines_for_verifier(
        &self,
        verifier: VerifierId,
        period: &Period,
    ) -> Result<Vec<VerifierPayout>> {
        let lines = self.lines.read().await;
        let mut matching: Vec<_> = lines
            .values()
            .filter(|l| l.verifier == verifier && period.contains(l.created_at))
            .cloned()
            .collect();
        matching.sort_by_key(|l| l.verification);
        Ok(matching)
    }

    async fn next_batch_id(&self) -> Result<PayoutBatchId> {
        Ok(PayoutBatchId(self.ids.next()))
    }

    async fn insert_batch_if_no_overlap(&self, batch: VerifierPayoutBatch) -> Result<bool> {
        let mut batches = self.batches.write().await;
        if batches
            .values()
            .any(|b| b.verifier == batch.verifier && b.period.overlaps(&batch.period))
        {
            return Ok(false);
        }
        batches.insert(batch.id, batch);
        Ok(true)
    }

    async fn get_batch(&self, id: PayoutBatchId) -> Result<Option<VerifierPayoutBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.get(&id).cloned())
    }

    async fn replace_batch(&self, mut batch: VerifierPayoutBatch) -> Result<bool> {
        let mut batches = self.batches.write().await;
        match batches.get(&batch.id) {
            Some(current) if current.version == batch.version => {
                batch.version += 1;
                batches.insert(batch.id, batch);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_batch_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<VerifierPayoutBatch>> {
        let batches = self.batches.read().await;
        Ok(batches
            .values()
            .find(|b| b.payout.transaction_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn batches_for_verifier(&self, verifier: VerifierId) -> Result<Vec<VerifierPayoutBatch>> {
        let batches = self.batches.read().await;
        let mut matching: Vec<_> = batches
            .values()
            .filter(|b| b.verifier == verifier)
            .cloned()
            .collect();
        matching.sort_by_key(|b| b.period.start);
        Ok(matching)
    }
}

/// Product catalog stand-in that remembers trust write-backs.
#[derive(Default, Clone)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductInfo>>>,
    trust: Arc<RwLock<HashMap<ProductId, (VerificationLevel, BTreeSet<String>)>>>,
    reject_writes: Arc<AtomicBool>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: ProductInfo) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn trust_of(&self, id: ProductId) -> Option<(VerificationLevel, BTreeSet<String>)> {
        self.trust.read().await.get(&id).cloned()
    }

    /// Makes subsequent trust write-backs fail, to exercise resync paths.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<ProductInfo>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn apply_trust(
        &self,
        id: ProductId,
        level: VerificationLevel,
        badges: &BTreeSet<String>,
    ) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(EngineError::CatalogError(format!(
                "product {id} is read-only"
            )));
        }
        if !self.products.read().await.contains_key(&id) {
            return Err(EngineError::NotFound(format!("product {id}")));
        }
        self.trust.write().await.insert(id, (level, badges.clone()));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryVerifierRegistry {
    profiles: Arc<RwLock<HashMap<VerifierId, VerifierProfile>>>,
}

impl InMemoryVerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: VerifierProfile) {
        self.profiles.write().await.insert(profile.id, profile);
    }
}

#[async_trait]
impl VerifierRegistry for InMemoryVerifierRegistry {
    async fn profile(&self, id: VerifierId) -> Result<Option<VerifierProfile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }
}

/// Payout destinations held in memory, typically loaded from configuration.
#[derive(Default, Clone)]
pub struct StaticPayeeDirectory {
    destinations: Arc<RwLock<HashMap<Payee, PayoutDestination>>>,
}

impl StaticPayeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Payee, PayoutDestination)>) -> Self {
        Self {
            destinations: Arc::new(RwLock::new(entries.into_iter().collect())),
        }
    }

    pub async fn insert(&self, payee: Payee, destination: PayoutDestination) {
        self.destinations.write().await.insert(payee, destination);
    }
}

#[async_trait]
impl PayeeDirectory for StaticPayeeDirectory {
    async fn destination(&self, payee: Payee) -> Result<Option<PayoutDestination>> {
        Ok(self.destinations.read().await.get(&payee).cloned())
    }
}

/// Collects delivered events; optionally fails every delivery.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    delivered: Arc<RwLock<Vec<DomainEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub async fn delivered(&self) -> Vec<DomainEvent> {
        self.delivered.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn deliver(&self, event: &DomainEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::InternalError(Box::new(std::io::Error::other(
                "notification channel unavailable",
            ))));
        }
        self.delivered.write().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fee::{FeeSchedule, VerificationLevel};
    use crate::domain::money::{Currency, Money};
    use crate::domain::settlement::SettlementTotals;
    use crate::domain::settlement::tests::{at, january, order, refund};
    use crate::domain::settlement::OrderStatus;
    use chrono::{NaiveDate, Utc};

    fn request(id: u64, product: u64) -> VerificationRequest {
        VerificationRequest::new(
            VerificationId(id),
            ProductId(product),
            SellerId(1),
            VerificationLevel::FUNCTIONAL,
            FeeSchedule::default()
                .quote(VerificationLevel::FUNCTIONAL)
                .unwrap(),
            Currency::Usd,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_replace_is_conditional_on_version() {
        let store = InMemoryVerificationStore::new();
        assert!(store.insert_if_no_active(request(1, 1)).await.unwrap());

        let first = store.get(VerificationId(1)).await.unwrap().unwrap();
        let second = first.clone();

        let mut winner = first;
        winner.verifier = Some(VerifierId(1));
        assert!(store.replace(winner).await.unwrap());

        let mut loser = second;
        loser.verifier = Some(VerifierId(2));
        assert!(!store.replace(loser).await.unwrap());

        let stored = store.get(VerificationId(1)).await.unwrap().unwrap();
        assert_eq!(stored.verifier, Some(VerifierId(1)));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_insert_blocked_by_active_request() {
        let store = InMemoryVerificationStore::new();
        assert!(store.insert_if_no_active(request(1, 9)).await.unwrap());
        assert!(!store.insert_if_no_active(request(2, 9)).await.unwrap());
        assert!(store.insert_if_no_active(request(3, 10)).await.unwrap());
        assert!(store.get(VerificationId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = InMemoryVerificationStore::new();
        assert_eq!(store.next_id().await.unwrap(), VerificationId(1));
        assert_eq!(store.next_id().await.unwrap(), VerificationId(2));
    }

    #[tokio::test]
    async fn test_settlement_overlap_guard() {
        let store = InMemorySettlementStore::new();
        let totals = SettlementTotals::aggregate(Currency::Usd, &january(), &[], &[]).unwrap();
        let first = Settlement::new(SettlementId(1), SellerId(1), january(), totals.clone(), at(2026, 2, 1));
        assert!(store.insert_if_no_overlap(first).await.unwrap());

        let overlapping = Period::new(
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
        )
        .unwrap();
        let clash = Settlement::new(SettlementId(2), SellerId(1), overlapping, totals.clone(), at(2026, 2, 1));
        assert!(!store.insert_if_no_overlap(clash).await.unwrap());

        let other_seller = Settlement::new(SettlementId(3), SellerId(2), overlapping, totals, at(2026, 2, 1));
        assert!(store.insert_if_no_overlap(other_seller).await.unwrap());
    }

    #[tokio::test]
    async fn test_payout_lines_are_unique_per_verification() {
        let store = InMemoryVerifierPayoutStore::new();
        let line = VerifierPayout {
            verifier: VerifierId(4),
            verification: VerificationId(1),
            amount: Money::new(4_500),
            currency: Currency::Usd,
            created_at: at(2026, 1, 10),
        };
        assert!(store.insert_line_if_absent(line.clone()).await.unwrap());
        assert!(!store.insert_line_if_absent(line).await.unwrap());
        let lines = store
            .lines_for_verifier(VerifierId(4), &january())
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn test_reimported_ledger_rows_replace_earlier_copies() {
        let ledger = InMemoryOrderLedger::new();
        for _ in 0..2 {
            ledger
                .record_order(order(1, 100_000, 10_000, OrderStatus::Paid, at(2026, 1, 5)))
                .await
                .unwrap();
            ledger
                .record_refund(refund(1, 20_000, at(2026, 1, 25)))
                .await
                .unwrap();
        }
        // a second, distinct refund of the same order is kept
        ledger
            .record_refund(refund(1, 5_000, at(2026, 1, 26)))
            .await
            .unwrap();

        let orders = ledger.orders_for_seller(SellerId(1), &january()).await.unwrap();
        let refunds = ledger.refunds_for_seller(SellerId(1), &january()).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(refunds.len(), 2);
        let totals = SettlementTotals::aggregate(Currency::Usd, &january(), &orders, &refunds).unwrap();
        assert_eq!(totals.net_payout, Money::new(65_000));
    }

    #[tokio::test]
    async fn test_failing_notifier() {
        let notifier = RecordingNotifier::failing();
        let event = DomainEvent::PanelReady {
            request: VerificationId(1),
        };
        assert!(notifier.deliver(&event).await.is_err());
        assert!(notifier.delivered().await.is_empty());
    }
}
