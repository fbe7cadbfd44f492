use super::event::DomainEvent;
use super::fee::VerificationLevel;
use super::ids::{
    ExpertReviewId, PayoutBatchId, ProductId, SellerId, SettlementId, VerificationId, VerifierId,
};
use super::panel::{Discipline, ExpertReview, ExpertReviewStatus};
use super::payout::{Payee, PayoutDestination, Period, TransferRequest};
use super::settlement::{OrderRecord, RefundRecord, Settlement};
use super::verification::{VerificationRequest, VerificationStatus};
use super::verifier_payout::{VerifierPayout, VerifierPayoutBatch};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Storage for verification requests.
///
/// Every mutation goes through [`VerificationStore::replace`], a conditional
/// write keyed on `version`. This is what makes claims race-free without any
/// in-process locking in the engines.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn next_id(&self) -> Result<VerificationId>;
    /// Inserts `request` unless its product already has a non-terminal request.
    /// Returns `false` when blocked.
    async fn insert_if_no_active(&self, request: VerificationRequest) -> Result<bool>;
    async fn get(&self, id: VerificationId) -> Result<Option<VerificationRequest>>;
    /// Stores `request` only if the stored version still equals
    /// `request.version`, then bumps the version. Returns `false` on mismatch.
    async fn replace(&self, request: VerificationRequest) -> Result<bool>;
    async fn list(&self, filter: &VerificationFilter) -> Result<Vec<VerificationRequest>>;
}

#[async_trait]
pub trait ExpertReviewStore: Send + Sync {
    async fn next_id(&self) -> Result<ExpertReviewId>;
    async fn insert(&self, review: ExpertReview) -> Result<()>;
    async fn get(&self, id: ExpertReviewId) -> Result<Option<ExpertReview>>;
    /// Conditional write, same contract as [`VerificationStore::replace`].
    async fn replace(&self, review: ExpertReview) -> Result<bool>;
    async fn for_request(&self, request: VerificationId) -> Result<Vec<ExpertReview>>;
    async fn with_status(&self, status: ExpertReviewStatus) -> Result<Vec<ExpertReview>>;
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn next_id(&self) -> Result<SettlementId>;
    /// Atomically checks that no settlement of the same seller overlaps
    /// `settlement.period` and inserts it. Returns `false` on overlap.
    async fn insert_if_no_overlap(&self, settlement: Settlement) -> Result<bool>;
    async fn get(&self, id: SettlementId) -> Result<Option<Settlement>>;
    async fn replace(&self, settlement: Settlement) -> Result<bool>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Settlement>>;
    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Settlement>>;
    async fn all(&self) -> Result<Vec<Settlement>>;
}

/// Read side of the order system, plus the write methods used when importing.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn record_order(&self, order: OrderRecord) -> Result<()>;
    async fn record_refund(&self, refund: RefundRecord) -> Result<()>;
    async fn orders_for_seller(&self, seller: SellerId, period: &Period) -> Result<Vec<OrderRecord>>;
    async fn refunds_for_seller(
        &self,
        seller: SellerId,
        period: &Period,
    ) -> Result<Vec<RefundRecord>>;
    async fn sellers(&self) -> Result<Vec<SellerId>>;
}

#[async_trait]
pub trait VerifierPayoutStore: Send + Sync {
    /// Inserts the line unless one already exists for its verification.
    async fn insert_line_if_absent(&self, line: VerifierPayout) -> Result<bool>;
    async fn line_for(&self, verification: VerificationId) -> Result<Option<VerifierPayout>>;
    async fn lines_for_verifier(
        &self,
        verifier: VerifierId,
        period: &Period,
    ) -> Result<Vec<VerifierPayout>>;
    async fn next_batch_id(&self) -> Result<PayoutBatchId>;
    async fn insert_batch_if_no_overlap(&self, batch: VerifierPayoutBatch) -> Result<bool>;
    async fn get_batch(&self, id: PayoutBatchId) -> Result<Option<VerifierPayoutBatch>>;
    async fn replace_batch(&self, batch: VerifierPayoutBatch) -> Result<bool>;
    async fn find_batch_by_reference(&self, reference: &str)
    -> Result<Option<VerifierPayoutBatch>>;
    async fn batches_for_verifier(&self, verifier: VerifierId) -> Result<Vec<VerifierPayoutBatch>>;
}

/// What the catalog knows about the uploaded artifact; input to level 0 checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub file_name: Option<String>,
    pub size_bytes: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: ProductId,
    pub seller: SellerId,
    pub title: String,
    pub artifact: ArtifactSummary,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<ProductInfo>>;
    /// Writes back the trust level and badges earned by an approval.
    async fn apply_trust(
        &self,
        id: ProductId,
        level: VerificationLevel,
        badges: &BTreeSet<String>,
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierProfile {
    pub id: VerifierId,
    pub active: bool,
    /// Highest level this verifier may lead.
    pub max_level: VerificationLevel,
    pub disciplines: BTreeSet<Discipline>,
}

impl VerifierProfile {
    pub fn can_lead(&self, level: VerificationLevel) -> bool {
        self.active && level <= self.max_level
    }

    pub fn covers(&self, discipline: Discipline) -> bool {
        self.active && self.disciplines.contains(&discipline)
    }
}

#[async_trait]
pub trait VerifierRegistry: Send + Sync {
    async fn profile(&self, id: VerifierId) -> Result<Option<VerifierProfile>>;
}

#[async_trait]
pub trait PayeeDirectory: Send + Sync {
    async fn destination(&self, payee: Payee) -> Result<Option<PayoutDestination>>;
}

/// Narrow contract with the payment provider: start a transfer and get the
/// provider's reference back. Completion arrives later as a status callback.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<String>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &DomainEvent) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Default)]
pub struct VerificationFilter {
    pub status: Option<VerificationStatus>,
    pub level: Option<VerificationLevel>,
    pub verifier: Option<VerifierId>,
    pub product: Option<ProductId>,
}

impl VerificationFilter {
    pub fn matches(&self, request: &VerificationRequest) -> bool {
        self.status.is_none_or(|s| s == request.status)
            && self.level.is_none_or(|l| l == request.level)
            && self.verifier.is_none_or(|v| request.verifier == Some(v))
            && self.product.is_none_or(|p| p == request.product)
    }
}

pub type VerificationStoreRef = Arc<dyn VerificationStore>;
pub type ExpertReviewStoreRef = Arc<dyn ExpertReviewStore>;
pub type SettlementStoreRef = Arc<dyn SettlementStore>;
pub type OrderLedgerRef = Arc<dyn OrderLedger>;
pub type VerifierPayoutStoreRef = Arc<dyn VerifierPayoutStore>;
pub type ProductCatalogRef = Arc<dyn ProductCatalog>;
pub type VerifierRegistryRef = Arc<dyn VerifierRegistry>;
pub type PayeeDirectoryRef = Arc<dyn PayeeDirectory>;
pub type PaymentProviderRef = Arc<dyn PaymentProvider>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type ClockRef = Arc<dyn Clock>;
