use crate::application::assignment::AssignmentEngine;
use crate::application::events::EventDispatcher;
use crate::application::panel::ExpertPanel;
use crate::application::payout::PayoutDriver;
use crate::application::settlement::SettlementEngine;
use crate::application::verification::VerificationEngine;
use crate::application::verifier_payout::VerifierPayoutLedger;
use crate::config::EngineConfig;
use crate::domain::event::Outcome;
use crate::domain::panel::ExpertReview;
use crate::domain::payout::{PayoutLifecycle, PayoutTarget, TransferStatus};
use crate::domain::ports::{
    ClockRef, ExpertReviewStoreRef, NotificationSinkRef, OrderLedgerRef, PayeeDirectoryRef,
    PaymentProviderRef, ProductCatalogRef, SettlementStoreRef, VerificationStoreRef,
    VerifierPayoutStoreRef, VerifierRegistryRef,
};
use crate::domain::settlement::Settlement;
use crate::domain::verification::VerificationRequest;
use crate::domain::verifier_payout::VerifierPayoutBatch;
use crate::error::{EngineError, Result};
use chrono::Duration;

/// Every adapter the engines need.
#[derive(Clone)]
pub struct PlatformPorts {
    pub verifications: VerificationStoreRef,
    pub expert_reviews: ExpertReviewStoreRef,
    pub settlements: SettlementStoreRef,
    pub orders: OrderLedgerRef,
    pub verifier_payouts: VerifierPayoutStoreRef,
    pub catalog: ProductCatalogRef,
    pub registry: VerifierRegistryRef,
    pub payees: PayeeDirectoryRef,
    pub provider: PaymentProviderRef,
    pub notifications: NotificationSinkRef,
    pub clock: ClockRef,
}

/// Open work that has waited past its configured threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaleWork {
    pub assignments: Vec<VerificationRequest>,
    pub expert_reviews: Vec<ExpertReview>,
}

/// The engines wired together over one set of ports.
#[derive(Clone)]
pub struct Platform {
    pub verification: VerificationEngine,
    pub assignment: AssignmentEngine,
    pub panel: ExpertPanel,
    pub settlement: SettlementEngine,
    pub verifier_payouts: VerifierPayoutLedger,
    pub events: EventDispatcher,
    assignment_staleness: Duration,
    expert_review_staleness: Duration,
}

impl Platform {
    pub fn new(config: &EngineConfig, ports: PlatformPorts) -> Self {
        let driver = PayoutDriver::new(ports.provider, ports.payees, ports.clock.clone());
        let panel = ExpertPanel::new(ports.expert_reviews, ports.registry.clone(), ports.clock.clone());
        let verifier_payouts = VerifierPayoutLedger::new(
            ports.verifier_payouts,
            driver.clone(),
            ports.clock.clone(),
            config.currency,
        );
        let verification = VerificationEngine::new(
            ports.verifications.clone(),
            ports.catalog,
            panel.clone(),
            verifier_payouts.clone(),
            ports.clock.clone(),
            config.fees.clone(),
            config.currency,
            config.automated_checks.clone(),
        );
        let assignment =
            AssignmentEngine::new(ports.verifications, ports.registry, ports.clock.clone());
        let settlement = SettlementEngine::new(
            ports.settlements,
            ports.orders,
            driver,
            ports.clock,
            config.currency,
        );
        Self {
            verification,
            assignment,
            panel,
            settlement,
            verifier_payouts,
            events: EventDispatcher::new(ports.notifications),
            assignment_staleness: config.assignment_staleness(),
            expert_review_staleness: config.expert_review_staleness(),
        }
    }

    /// Routes a provider callback by the prefix of its transaction reference.
    pub async fn apply_transfer_status(
        &self,
        reference: &str,
        status: TransferStatus,
    ) -> Result<Outcome<PayoutTarget>> {
        let prefix = reference.split('-').next().unwrap_or_default();
        if prefix == <Settlement as PayoutLifecycle>::REFERENCE_PREFIX {
            let outcome = self
                .settlement
                .apply_transfer_status(reference, status)
                .await?;
            Ok(outcome.map(|s| s.target()))
        } else if prefix == <VerifierPayoutBatch as PayoutLifecycle>::REFERENCE_PREFIX {
            let outcome = self
                .verifier_payouts
                .apply_transfer_status(reference, status)
                .await?;
            Ok(outcome.map(|b| b.target()))
        } else {
            Err(EngineError::NotFound(format!("payout reference {reference}")))
        }
    }

    /// Runs both staleness detectors with the configured thresholds.
    pub async fn detect_stale_work(&self) -> Result<Outcome<StaleWork>> {
        let (assignments, mut events) = self
            .assignment
            .stale_assignments(self.assignment_staleness)
            .await?
            .into_parts();
        let (expert_reviews, review_events) = self
            .panel
            .stale_reviews(self.expert_review_staleness)
            .await?
            .into_parts();
        events.extend(review_events);
        Ok(Outcome::new(StaleWork {
            assignments,
            expert_reviews,
        })
        .with_events(events))
    }
}
