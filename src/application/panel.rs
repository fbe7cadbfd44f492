//! Expert panel fan-out for levels 2 and 3.
//!
//! Each required discipline gets its own [`ExpertReview`] that is assigned,
//! worked and submitted independently. The parent request may only be decided
//! once every sub-review is `REVIEWED`.

use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::ids::{AdminId, ExpertReviewId, VerificationId, VerifierId};
use crate::domain::fee::VerificationLevel;
use crate::domain::panel::{
    Discipline, ExpertFindings, ExpertReview, ExpertReviewStatus, panel_complete,
};
use crate::domain::ports::{ClockRef, ExpertReviewStoreRef, VerifierRegistryRef};
use crate::domain::verification::VerificationRequest;
use crate::error::{EngineError, Result};
use chrono::Duration;
use tracing::{debug, info};

/// Conditional writes retried by [`ExpertPanel::cancel_panel`] before giving up.
const CANCEL_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct ExpertPanel {
    reviews: ExpertReviewStoreRef,
    registry: VerifierRegistryRef,
    clock: ClockRef,
}

impl ExpertPanel {
    pub fn new(reviews: ExpertReviewStoreRef, registry: VerifierRegistryRef, clock: ClockRef) -> Self {
        Self {
            reviews,
            registry,
            clock,
        }
    }

    async fn load(&self, id: ExpertReviewId) -> Result<ExpertReview> {
        self.reviews
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("expert review {id}")))
    }

    async fn commit(&self, mut review: ExpertReview) -> Result<ExpertReview> {
        if !self.reviews.replace(review.clone()).await? {
            return Err(EngineError::ConcurrentModification(format!(
                "expert review {}",
                review.id
            )));
        }
        review.version += 1;
        Ok(review)
    }

    async fn ensure_covers(&self, expert: VerifierId, discipline: Discipline) -> Result<()> {
        match self.registry.profile(expert).await? {
            Some(profile) if profile.covers(discipline) => Ok(()),
            _ => Err(EngineError::NotEligible(expert)),
        }
    }

    /// Creates one pending sub-review per required discipline. Calling it
    /// again for the same request only adds the disciplines still missing.
    pub async fn create_panel(&self, request: &VerificationRequest) -> Result<Vec<ExpertReview>> {
        let mut panel = self.reviews.for_request(request.id).await?;
        let now = self.clock.now();
        let mut created = 0;
        for &discipline in Discipline::required_for(request.level) {
            if panel.iter().any(|r| r.discipline == discipline) {
                continue;
            }
            let id = self.reviews.next_id().await?;
            let review = ExpertReview::new(id, request.id, request.level, discipline, now);
            self.reviews.insert(review.clone()).await?;
            panel.push(review);
            created += 1;
        }
        if created > 0 {
            info!(request = %request.id, created, size = panel.len(), "expert panel created");
        }
        Ok(panel)
    }

    pub async fn panel(&self, request: VerificationId) -> Result<Vec<ExpertReview>> {
        self.reviews.for_request(request).await
    }

    pub async fn assign_expert(
        &self,
        id: ExpertReviewId,
        expert: VerifierId,
        admin: AdminId,
    ) -> Result<Outcome<ExpertReview>> {
        let mut review = self.load(id).await?;
        self.ensure_covers(expert, review.discipline).await?;
        review.assign(expert, self.clock.now())?;
        let review = match self.commit(review).await {
            Ok(review) => review,
            Err(EngineError::ConcurrentModification(_)) => {
                let current = self.load(id).await?;
                return Err(match current.expert {
                    Some(holder) => EngineError::AlreadyAssigned(holder),
                    None => EngineError::ConcurrentModification(format!("expert review {id}")),
                });
            }
            Err(e) => return Err(e),
        };
        info!(review = %id, %expert, %admin, discipline = %review.discipline, "expert assigned");
        let event = DomainEvent::ExpertAssigned {
            review: id,
            request: review.request,
            discipline: review.discipline,
            expert,
            assigned_by: Some(admin),
        };
        Ok(Outcome::new(review).with_event(event))
    }

    /// Self-service claim; exactly one of several concurrent claimers wins.
    pub async fn claim_expert(
        &self,
        id: ExpertReviewId,
        expert: VerifierId,
    ) -> Result<Outcome<ExpertReview>> {
        let mut review = self.load(id).await?;
        self.ensure_covers(expert, review.discipline).await?;
        match review.assign(expert, self.clock.now()) {
            Err(EngineError::AlreadyAssigned(_)) => return Err(EngineError::AlreadyClaimed),
            other => other?,
        }
        let review = match self.commit(review).await {
            Err(EngineError::ConcurrentModification(_)) => return Err(EngineError::AlreadyClaimed),
            other => other?,
        };
        info!(review = %id, %expert, discipline = %review.discipline, "expert review claimed");
        let event = DomainEvent::ExpertAssigned {
            review: id,
            request: review.request,
            discipline: review.discipline,
            expert,
            assigned_by: None,
        };
        Ok(Outcome::new(review).with_event(event))
    }

    pub async fn unclaim_expert(
        &self,
        id: ExpertReviewId,
        expert: VerifierId,
    ) -> Result<Outcome<ExpertReview>> {
        let mut review = self.load(id).await?;
        review.release(expert)?;
        let review = self.commit(review).await?;
        info!(review = %id, %expert, "expert review released");
        let event = DomainEvent::ExpertReleased {
            review: id,
            request: review.request,
            expert,
        };
        Ok(Outcome::new(review).with_event(event))
    }

    pub async fn start_expert_review(
        &self,
        id: ExpertReviewId,
        expert: VerifierId,
    ) -> Result<ExpertReview> {
        let mut review = self.load(id).await?;
        review.start(expert, self.clock.now())?;
        let review = self.commit(review).await?;
        debug!(review = %id, %expert, "expert review started");
        Ok(review)
    }

    /// Records findings. When this was the last open sub-review the outcome
    /// also carries `PanelReady`.
    pub async fn submit_expert_review(
        &self,
        id: ExpertReviewId,
        expert: VerifierId,
        findings: ExpertFindings,
    ) -> Result<Outcome<ExpertReview>> {
        let mut review = self.load(id).await?;
        review.submit(expert, findings, self.clock.now())?;
        let review = self.commit(review).await?;
        info!(review = %id, request = %review.request, discipline = %review.discipline, "expert review submitted");

        let mut outcome = Outcome::new(review.clone()).with_event(DomainEvent::ExpertReviewCompleted {
            review: id,
            request: review.request,
            discipline: review.discipline,
        });
        if self.panel_ready(review.request, review.level).await? {
            info!(request = %review.request, "expert panel complete");
            outcome = outcome.with_event(DomainEvent::PanelReady {
                request: review.request,
            });
        }
        Ok(outcome)
    }

    /// True when every discipline the request's level needs has a `REVIEWED`
    /// sub-review; vacuously true without a panel.
    pub async fn is_decision_ready(&self, request: &VerificationRequest) -> Result<bool> {
        self.panel_ready(request.id, request.level).await
    }

    async fn panel_ready(&self, request: VerificationId, level: VerificationLevel) -> Result<bool> {
        let panel = self.reviews.for_request(request).await?;
        Ok(panel_complete(level, &panel))
    }

    /// Unassigned sub-reviews older than `threshold`. Reported only.
    pub async fn stale_reviews(&self, threshold: Duration) -> Result<Outcome<Vec<ExpertReview>>> {
        let now = self.clock.now();
        let stale: Vec<ExpertReview> = self
            .reviews
            .with_status(ExpertReviewStatus::Pending)
            .await?
            .into_iter()
            .filter(|r| r.is_stale(now, threshold))
            .collect();
        let events: Vec<DomainEvent> = stale
            .iter()
            .map(|r| DomainEvent::ExpertReviewStale {
                review: r.id,
                request: r.request,
                discipline: r.discipline,
                created_at: r.created_at,
            })
            .collect();
        if !stale.is_empty() {
            info!(count = stale.len(), "stale expert reviews detected");
        }
        Ok(Outcome::new(stale).with_events(events))
    }

    /// Cancels every open sub-review of `request`. Returns how many changed.
    pub async fn cancel_panel(&self, request: VerificationId) -> Result<usize> {
        let mut cancelled = 0;
        for review in self.reviews.for_request(request).await? {
            if review.status.is_terminal() {
                continue;
            }
            let mut attempt = 0;
            loop {
                let mut current = self.load(review.id).await?;
                if current.status.is_terminal() {
                    break;
                }
                current.cancel()?;
                if self.reviews.replace(current).await? {
                    cancelled += 1;
                    break;
                }
                attempt += 1;
                if attempt == CANCEL_ATTEMPTS {
                    return Err(EngineError::ConcurrentModification(format!(
                        "expert review {}",
                        review.id
                    )));
                }
            }
        }
        if cancelled > 0 {
            info!(%request, cancelled, "expert panel cancelled");
        }
        Ok(cancelled)
    }
}
