use crate::application::checks::run_basic_checks;
use crate::application::panel::ExpertPanel;
use crate::application::verifier_payout::VerifierPayoutLedger;
use crate::config::AutomatedCheckConfig;
use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::fee::{FeeSchedule, VerificationLevel};
use crate::domain::ids::{AdminId, ProductId, SellerId, VerificationId, VerifierId};
use crate::domain::money::Currency;
use crate::domain::ports::{ClockRef, ProductCatalogRef, VerificationFilter, VerificationStoreRef};
use crate::domain::verification::{
    Actor, Decision, ReviewSubmission, VerificationRequest, VerificationStatus,
};
use crate::domain::verifier_payout::VerifierPayout;
use crate::error::{EngineError, Result};
use tracing::{debug, info, warn};

pub(crate) async fn load_request(
    store: &VerificationStoreRef,
    id: VerificationId,
) -> Result<VerificationRequest> {
    store
        .get(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("verification {id}")))
}

/// Conditional write of `request`; on success the local copy's version is
/// advanced to match the store.
pub(crate) async fn commit_request(
    store: &VerificationStoreRef,
    mut request: VerificationRequest,
) -> Result<VerificationRequest> {
    if !store.replace(request.clone()).await? {
        return Err(EngineError::ConcurrentModification(format!(
            "verification {}",
            request.id
        )));
    }
    request.version += 1;
    Ok(request)
}

/// Lifecycle of a verification request from filing to the admin's decision.
#[derive(Clone)]
pub struct VerificationEngine {
    verifications: VerificationStoreRef,
    catalog: ProductCatalogRef,
    panel: ExpertPanel,
    earnings: VerifierPayoutLedger,
    clock: ClockRef,
    fees: FeeSchedule,
    currency: Currency,
    checks: AutomatedCheckConfig,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifications: VerificationStoreRef,
        catalog: ProductCatalogRef,
        panel: ExpertPanel,
        earnings: VerifierPayoutLedger,
        clock: ClockRef,
        fees: FeeSchedule,
        currency: Currency,
        checks: AutomatedCheckConfig,
    ) -> Self {
        Self {
            verifications,
            catalog,
            panel,
            earnings,
            clock,
            fees,
            currency,
            checks,
        }
    }

    /// Files a request for `product` at `level` on behalf of its seller.
    ///
    /// Level 0 runs the automated checks inline; a passing report completes
    /// the request immediately. Levels 2 and 3 get their expert panel.
    pub async fn request_verification(
        &self,
        product: ProductId,
        level: u8,
        requested_by: SellerId,
    ) -> Result<Outcome<VerificationRequest>> {
        let level = VerificationLevel::new(level)?;
        let info = self
            .catalog
            .product(product)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("product {product}")))?;
        if info.seller != requested_by {
            return Err(EngineError::NotAuthorized(format!(
                "seller {requested_by} does not own product {product}"
            )));
        }

        let split = self.fees.quote(level)?;
        let now = self.clock.now();
        let id = self.verifications.next_id().await?;
        let mut request =
            VerificationRequest::new(id, product, requested_by, level, split, self.currency, now);

        let mut events = vec![DomainEvent::VerificationRequested {
            request: id,
            product,
            level,
        }];
        if level == VerificationLevel::BASIC {
            let report = run_basic_checks(&info, &self.checks, now);
            events.push(DomainEvent::AutomatedChecksCompleted {
                request: id,
                passed: report.passed(),
            });
            request.record_automated(report, now)?;
        }

        if !self.verifications.insert_if_no_active(request.clone()).await? {
            return Err(EngineError::AlreadyPending(product));
        }
        info!(request = %id, %product, %level, fee = %request.fee, status = %request.status, "verification requested");

        if level.requires_panel()
            && let Err(e) = self.panel.create_panel(&request).await
        {
            self.withdraw(request, &e).await;
            return Err(e);
        }
        Ok(Outcome::new(request).with_events(events))
    }

    /// Takes back a request whose panel could not be set up, so the product
    /// is free for a new request and no partial panel stays open.
    async fn withdraw(&self, mut request: VerificationRequest, cause: &EngineError) {
        let id = request.id;
        let reason = format!("expert panel could not be created: {cause}");
        let withdrawn = match request.cancel(Actor::System, reason, self.clock.now()) {
            Ok(()) => commit_request(&self.verifications, request).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = withdrawn {
            warn!(request = %id, error = %e, "could not withdraw request after panel failure");
            return;
        }
        if let Err(e) = self.panel.cancel_panel(id).await {
            warn!(request = %id, error = %e, "could not cancel partial expert panel");
        }
        warn!(request = %id, error = %cause, "request withdrawn after panel failure");
    }

    pub async fn start_review(
        &self,
        id: VerificationId,
        verifier: VerifierId,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        request.start(verifier, self.clock.now())?;
        let request = commit_request(&self.verifications, request).await?;
        debug!(request = %id, %verifier, "review started");
        Ok(Outcome::new(request).with_event(DomainEvent::ReviewStarted {
            request: id,
            verifier,
        }))
    }

    pub async fn submit_review(
        &self,
        id: VerificationId,
        verifier: VerifierId,
        submission: ReviewSubmission,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        let score = submission.score;
        request.complete_review(verifier, submission, self.clock.now())?;
        let request = commit_request(&self.verifications, request).await?;
        info!(request = %id, %verifier, score, "review submitted");
        Ok(Outcome::new(request).with_event(DomainEvent::ReviewCompleted {
            request: id,
            verifier,
            score,
        }))
    }

    /// Records the admin's decision.
    ///
    /// The decision is committed first. On approval the trust write-back and
    /// the verifier's earning follow. Neither failure undoes the decision:
    /// they are reported as `TrustSyncFailed` and `EarningRecordFailed` for
    /// [`Self::resync_trust`] and [`Self::resync_earning`].
    pub async fn finalize(
        &self,
        id: VerificationId,
        admin: AdminId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        if request.status == VerificationStatus::Completed
            && !self.panel.is_decision_ready(&request).await?
        {
            return Err(EngineError::NotReadyForDecision);
        }
        request.finalize(admin, decision, comment, self.clock.now())?;
        let request = commit_request(&self.verifications, request).await?;
        info!(request = %id, %admin, ?decision, "verification finalized");

        let mut outcome = Outcome::new(request.clone()).with_event(DomainEvent::VerificationFinalized {
            request: id,
            product: request.product,
            decision,
            platform_share: request.platform_share,
            verifier_share: request.verifier_share,
        });
        if decision == Decision::Rejected {
            return Ok(outcome);
        }

        if let Err(e) = self
            .catalog
            .apply_trust(request.product, request.level, &request.badges)
            .await
        {
            warn!(request = %id, product = %request.product, error = %e, "trust write-back failed");
            outcome = outcome.with_event(DomainEvent::TrustSyncFailed {
                request: id,
                product: request.product,
                reason: e.to_string(),
            });
        }
        match self.earnings.record_earning(&request).await {
            Ok(earning) => outcome = outcome.with_events(earning.events),
            Err(e) => {
                warn!(request = %id, verifier = ?request.verifier, error = %e, "verifier earning not recorded");
                outcome = outcome.with_event(DomainEvent::EarningRecordFailed {
                    request: id,
                    verifier: request.verifier,
                    reason: e.to_string(),
                });
            }
        }
        Ok(outcome)
    }

    /// Cancels a request that has not reached `COMPLETED`, together with any
    /// open panel reviews. Sellers may only cancel their own requests.
    pub async fn cancel(
        &self,
        id: VerificationId,
        actor: Actor,
        reason: String,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        if let Actor::Seller(seller) = actor
            && seller != request.seller
        {
            return Err(EngineError::NotAuthorized(format!(
                "seller {seller} does not own verification {id}"
            )));
        }
        request.cancel(actor, reason, self.clock.now())?;
        let request = commit_request(&self.verifications, request).await?;
        let cascaded = self.panel.cancel_panel(id).await?;
        info!(request = %id, %actor, cascaded, "verification cancelled");
        Ok(Outcome::new(request).with_event(DomainEvent::VerificationCancelled { request: id, actor }))
    }

    /// Re-sends the trust write-back for an approved request.
    pub async fn resync_trust(&self, id: VerificationId) -> Result<()> {
        let request = load_request(&self.verifications, id).await?;
        if request.status != VerificationStatus::Approved {
            return Err(EngineError::InvalidTransition {
                entity: "verification",
                id: id.to_string(),
                status: request.status.to_string(),
                action: "resync trust",
            });
        }
        self.catalog
            .apply_trust(request.product, request.level, &request.badges)
            .await?;
        info!(request = %id, product = %request.product, "trust resynced");
        Ok(())
    }

    /// Records the verifier's earning for an approved request if it is still
    /// missing. Safe to repeat.
    pub async fn resync_earning(
        &self,
        id: VerificationId,
    ) -> Result<Outcome<Option<VerifierPayout>>> {
        let request = load_request(&self.verifications, id).await?;
        let outcome = self.earnings.record_earning(&request).await?;
        if outcome.value.is_some() {
            info!(request = %id, "verifier earning resynced");
        }
        Ok(outcome)
    }

    pub async fn get(&self, id: VerificationId) -> Result<VerificationRequest> {
        load_request(&self.verifications, id).await
    }

    pub async fn list(&self, filter: &VerificationFilter) -> Result<Vec<VerificationRequest>> {
        self.verifications.list(filter).await
    }
}
