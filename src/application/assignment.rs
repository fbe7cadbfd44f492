//! Binding verifiers to requests, by admin assignment or self-service claim.
//!
//! Both paths end in a single conditional write on the request's version, so
//! when several verifiers race for the same task exactly one write lands.

use crate::application::verification::{commit_request, load_request};
use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::ids::{AdminId, VerificationId, VerifierId};
use crate::domain::ports::{ClockRef, VerificationFilter, VerificationStoreRef, VerifierRegistryRef};
use crate::domain::verification::{VerificationRequest, VerificationStatus};
use crate::error::{EngineError, Result};
use chrono::Duration;
use tracing::info;

#[derive(Clone)]
pub struct AssignmentEngine {
    verifications: VerificationStoreRef,
    registry: VerifierRegistryRef,
    clock: ClockRef,
}

impl AssignmentEngine {
    pub fn new(
        verifications: VerificationStoreRef,
        registry: VerifierRegistryRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            verifications,
            registry,
            clock,
        }
    }

    async fn ensure_eligible(&self, verifier: VerifierId, request: &VerificationRequest) -> Result<()> {
        match self.registry.profile(verifier).await? {
            Some(profile) if profile.can_lead(request.level) => Ok(()),
            _ => Err(EngineError::NotEligible(verifier)),
        }
    }

    pub async fn assign(
        &self,
        id: VerificationId,
        verifier: VerifierId,
        admin: AdminId,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        request.assign(verifier, self.clock.now())?;
        self.ensure_eligible(verifier, &request).await?;
        let request = match commit_request(&self.verifications, request).await {
            Ok(request) => request,
            Err(EngineError::ConcurrentModification(_)) => {
                let current = load_request(&self.verifications, id).await?;
                return Err(match current.verifier {
                    Some(holder) => EngineError::AlreadyAssigned(holder),
                    None => EngineError::ConcurrentModification(format!("verification {id}")),
                });
            }
            Err(e) => return Err(e),
        };
        info!(request = %id, %verifier, %admin, "verifier assigned");
        Ok(Outcome::new(request).with_event(DomainEvent::VerifierAssigned {
            request: id,
            verifier,
            assigned_by: Some(admin),
        }))
    }

    /// Self-service claim. Losing a race, or finding the task already taken,
    /// yields `AlreadyClaimed`.
    pub async fn claim(
        &self,
        id: VerificationId,
        verifier: VerifierId,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        match request.assign(verifier, self.clock.now()) {
            Err(EngineError::AlreadyAssigned(_)) => return Err(EngineError::AlreadyClaimed),
            other => other?,
        }
        self.ensure_eligible(verifier, &request).await?;
        let request = match commit_request(&self.verifications, request).await {
            Err(EngineError::ConcurrentModification(_)) => return Err(EngineError::AlreadyClaimed),
            other => other?,
        };
        info!(request = %id, %verifier, "verification claimed");
        Ok(Outcome::new(request).with_event(DomainEvent::VerifierAssigned {
            request: id,
            verifier,
            assigned_by: None,
        }))
    }

    pub async fn unclaim(
        &self,
        id: VerificationId,
        verifier: VerifierId,
    ) -> Result<Outcome<VerificationRequest>> {
        let mut request = load_request(&self.verifications, id).await?;
        request.release(verifier)?;
        let request = commit_request(&self.verifications, request).await?;
        info!(request = %id, %verifier, "verification released");
        Ok(Outcome::new(request).with_event(DomainEvent::VerifierReleased {
            request: id,
            verifier,
        }))
    }

    /// Pending, unbound requests `verifier` may lead, oldest first.
    pub async fn claimable(&self, verifier: VerifierId) -> Result<Vec<VerificationRequest>> {
        let Some(profile) = self.registry.profile(verifier).await? else {
            return Ok(Vec::new());
        };
        let filter = VerificationFilter {
            status: Some(VerificationStatus::Pending),
            ..Default::default()
        };
        let mut open: Vec<_> = self
            .verifications
            .list(&filter)
            .await?
            .into_iter()
            .filter(|r| r.verifier.is_none() && profile.can_lead(r.level))
            .collect();
        open.sort_by_key(|r| (r.requested_at, r.id));
        Ok(open)
    }

    /// Requests sitting in `ASSIGNED` for longer than `threshold`. Reported only;
    /// nothing is released automatically.
    pub async fn stale_assignments(
        &self,
        threshold: Duration,
    ) -> Result<Outcome<Vec<VerificationRequest>>> {
        let now = self.clock.now();
        let filter = VerificationFilter {
            status: Some(VerificationStatus::Assigned),
            ..Default::default()
        };
        let stale: Vec<_> = self
            .verifications
            .list(&filter)
            .await?
            .into_iter()
            .filter(|r| r.assigned_at.is_some_and(|at| now - at > threshold))
            .collect();
        let events: Vec<_> = stale
            .iter()
            .filter_map(|r| {
                Some(DomainEvent::AssignmentStale {
                    request: r.id,
                    verifier: r.verifier?,
                    assigned_at: r.assigned_at?,
                })
            })
            .collect();
        if !stale.is_empty() {
            info!(count = stale.len(), "stale assignments detected");
        }
        Ok(Outcome::new(stale).with_events(events))
    }
}
