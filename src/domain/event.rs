use crate::domain::fee::VerificationLevel;
use crate::domain::ids::{
    AdminId, ExpertReviewId, ProductId, SellerId, SettlementId, VerificationId, VerifierId,
};
use crate::domain::money::Money;
use crate::domain::panel::Discipline;
use crate::domain::payout::{Payee, PayoutTarget};
use crate::domain::verification::{Actor, Decision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something a downstream consumer (notifications, audit) may care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    VerificationRequested {
        request: VerificationId,
        product: ProductId,
        level: VerificationLevel,
    },
    AutomatedChecksCompleted {
        request: VerificationId,
        passed: bool,
    },
    VerifierAssigned {
        request: VerificationId,
        verifier: VerifierId,
        assigned_by: Option<AdminId>,
    },
    VerifierReleased {
        request: VerificationId,
        verifier: VerifierId,
    },
    ReviewStarted {
        request: VerificationId,
        verifier: VerifierId,
    },
    ReviewCompleted {
        request: VerificationId,
        verifier: VerifierId,
        score: u8,
    },
    ExpertAssigned {
        review: ExpertReviewId,
        request: VerificationId,
        discipline: Discipline,
        expert: VerifierId,
        assigned_by: Option<AdminId>,
    },
    ExpertReleased {
        review: ExpertReviewId,
        request: VerificationId,
        expert: VerifierId,
    },
    ExpertReviewCompleted {
        review: ExpertReviewId,
        request: VerificationId,
        discipline: Discipline,
    },
    /// The last outstanding panel review finished.
    PanelReady {
        request: VerificationId,
    },
    VerificationFinalized {
        request: VerificationId,
        product: ProductId,
        decision: Decision,
        platform_share: Money,
        verifier_share: Money,
    },
    VerificationCancelled {
        request: VerificationId,
        actor: Actor,
    },
    TrustSyncFailed {
        request: VerificationId,
        product: ProductId,
        reason: String,
    },
    /// The decision stands but the verifier's earning line was not written.
    EarningRecordFailed {
        request: VerificationId,
        verifier: Option<VerifierId>,
        reason: String,
    },
    VerifierEarningRecorded {
        verifier: VerifierId,
        request: VerificationId,
        amount: Money,
    },
    AssignmentStale {
        request: VerificationId,
        verifier: VerifierId,
        assigned_at: DateTime<Utc>,
    },
    ExpertReviewStale {
        review: ExpertReviewId,
        request: VerificationId,
        discipline: Discipline,
        created_at: DateTime<Utc>,
    },
    SettlementReady {
        settlement: SettlementId,
        seller: SellerId,
        net_payout: Money,
    },
    PayoutSubmitted {
        target: PayoutTarget,
        payee: Payee,
        reference: String,
    },
    PayoutCompleted {
        target: PayoutTarget,
        payee: Payee,
    },
    PayoutFailed {
        target: PayoutTarget,
        payee: Payee,
        reason: String,
    },
}

/// A successful operation's result plus the events it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: DomainEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = DomainEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            events: self.events,
        }
    }

    pub fn into_parts(self) -> (T, Vec<DomainEvent>) {
        (self.value, self.events)
    }
}
