mod common;

use chrono::{Duration, NaiveDate};
use common::*;
use verisettle::domain::event::DomainEvent;
use verisettle::domain::fee::VerificationLevel;
use verisettle::domain::ids::{AdminId, ProductId, SellerId};
use verisettle::domain::money::Money;
use verisettle::domain::panel::{Discipline, ExpertFindings, ExpertReviewStatus};
use verisettle::domain::payout::{Payee, PayoutMethod, PayoutTarget, Period, TransferStatus};
use verisettle::domain::verification::{
    Actor, Decision, PanelLeadReport, Recommendation, ReviewReport, VerificationStatus,
};
use verisettle::domain::verifier_payout::PayoutBatchStatus;
use verisettle::error::EngineError;

const ADMIN: AdminId = AdminId(1);

fn january() -> Period {
    Period::new(
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_functional_verification_pays_verifier() {
    let h = harness().await;
    let p = &h.platform;

    let request = p
        .verification
        .request_verification(PRODUCT, 1, SELLER)
        .await
        .unwrap()
        .value;
    assert_eq!(request.status, VerificationStatus::Pending);
    assert_eq!(request.fee, Money::new(5_000));
    assert_eq!(request.platform_share, Money::new(500));
    assert_eq!(request.verifier_share, Money::new(4_500));

    p.assignment.claim(request.id, JUNIOR).await.unwrap();
    p.verification.start_review(request.id, JUNIOR).await.unwrap();
    p.verification
        .submit_review(
            request.id,
            JUNIOR,
            approve(92, ReviewReport::Functional(functional_report())),
        )
        .await
        .unwrap();

    let outcome = p
        .verification
        .finalize(request.id, ADMIN, Decision::Approved, None)
        .await
        .unwrap();
    assert_eq!(outcome.value.status, VerificationStatus::Approved);
    assert!(outcome.events.iter().any(|e| matches!(
        e,
        DomainEvent::VerifierEarningRecorded { amount, .. } if *amount == Money::new(4_500)
    )));
    assert_eq!(p.events.dispatch(&outcome.events).await, outcome.events.len());
    assert_eq!(h.notifier.delivered().await.len(), outcome.events.len());

    let (level, badges) = h.catalog.trust_of(PRODUCT).await.unwrap();
    assert_eq!(level, VerificationLevel::FUNCTIONAL);
    assert!(badges.contains("functionally-verified"));
    assert!(badges.contains("documented"));
    assert!(badges.contains("multi-environment"));

    let lines = p.verifier_payouts.lines(JUNIOR, &january()).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].amount, Money::new(4_500));
    assert_eq!(lines[0].verification, request.id);

    let batch = p
        .verifier_payouts
        .calculate_batch(JUNIOR, january().start, january().end)
        .await
        .unwrap();
    assert_eq!(batch.totals.total, Money::new(4_500));
    assert_eq!(batch.totals.line_count, 1);

    h.register_payee(Payee::Verifier(JUNIOR), "June Verifier").await;
    let submitted = p
        .verifier_payouts
        .process_batch_payout(batch.id, PayoutMethod::BankTransfer)
        .await
        .unwrap()
        .value;
    assert_eq!(submitted.status, PayoutBatchStatus::Processing);
    let transfers = h.provider.submitted().await;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, Money::new(4_500));

    let reference = submitted.payout.transaction_reference.clone().unwrap();
    let routed = p
        .apply_transfer_status(&reference, TransferStatus::Succeeded { paid_at: at(6, 12) })
        .await
        .unwrap();
    assert_eq!(routed.value, PayoutTarget::VerifierBatch(batch.id));
    let batches = p.verifier_payouts.batches(JUNIOR).await.unwrap();
    assert_eq!(batches[0].status, PayoutBatchStatus::Paid);
    assert_eq!(batches[0].payout.payout_date, Some(at(6, 12)));
}

#[tokio::test]
async fn test_rejection_records_no_earning() {
    let h = harness().await;
    let p = &h.platform;

    let id = p
        .verification
        .request_verification(PRODUCT, 1, SELLER)
        .await
        .unwrap()
        .value
        .id;
    p.assignment.assign(id, JUNIOR, ADMIN).await.unwrap();
    p.verification.start_review(id, JUNIOR).await.unwrap();
    p.verification
        .submit_review(
            id,
            JUNIOR,
            approve(40, ReviewReport::Functional(functional_report())),
        )
        .await
        .unwrap();

    let missing_reason = p
        .verification
        .finalize(id, ADMIN, Decision::Rejected, None)
        .await;
    assert!(matches!(missing_reason, Err(EngineError::ValidationError(_))));

    let rejected = p
        .verification
        .finalize(id, ADMIN, Decision::Rejected, Some("crashes on start".to_string()))
        .await
        .unwrap()
        .value;
    assert_eq!(rejected.status, VerificationStatus::Rejected);
    assert!(h.catalog.trust_of(PRODUCT).await.is_none());
    assert!(
        p.verifier_payouts
            .lines(JUNIOR, &january())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_expert_panel_gates_the_decision() {
    let h = harness().await;
    let p = &h.platform;

    let request = p
        .verification
        .request_verification(PRODUCT, 3, SELLER)
        .await
        .unwrap()
        .value;
    let panel = p.panel.panel(request.id).await.unwrap();
    assert_eq!(panel.len(), Discipline::ALL.len());

    p.assignment.claim(request.id, LEAD).await.unwrap();
    p.verification.start_review(request.id, LEAD).await.unwrap();
    let report = ReviewReport::PanelLead(PanelLeadReport {
        security: match security_report() {
            ReviewReport::Security(security) => security,
            _ => unreachable!(),
        },
        summary: "solid architecture, clear domain model".to_string(),
    });
    p.verification
        .submit_review(request.id, LEAD, approve(88, report))
        .await
        .unwrap();

    let early = p
        .verification
        .finalize(request.id, ADMIN, Decision::Approved, None)
        .await;
    assert!(matches!(early, Err(EngineError::NotReadyForDecision)));

    let mut ready_events = 0;
    for review in &panel {
        let expert = expert_for(review.discipline);
        p.panel.claim_expert(review.id, expert).await.unwrap();
        p.panel.start_expert_review(review.id, expert).await.unwrap();
        let outcome = p
            .panel
            .submit_expert_review(
                review.id,
                expert,
                ExpertFindings {
                    score: 85,
                    recommendation: Recommendation::Approve,
                    comments: String::new(),
                },
            )
            .await
            .unwrap();
        ready_events += outcome
            .events
            .iter()
            .filter(|e| matches!(e, DomainEvent::PanelReady { .. }))
            .count();
    }
    assert_eq!(ready_events, 1);
    assert!(p.panel.is_decision_ready(&request).await.unwrap());

    let approved = p
        .verification
        .finalize(request.id, ADMIN, Decision::Approved, None)
        .await
        .unwrap()
        .value;
    assert_eq!(approved.status, VerificationStatus::Approved);
    assert!(approved.badges.contains("expert-verified"));
    assert!(approved.badges.contains("no-known-vulnerabilities"));

    let lines = p.verifier_payouts.lines(LEAD, &january()).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].amount, Money::new(32_000));
}

#[tokio::test]
async fn test_cancel_cascades_to_panel() {
    let h = harness().await;
    let p = &h.platform;

    let id = p
        .verification
        .request_verification(PRODUCT, 2, SELLER)
        .await
        .unwrap()
        .value
        .id;
    let panel = p.panel.panel(id).await.unwrap();
    assert_eq!(panel.len(), 2);
    let first = &panel[0];
    p.panel
        .claim_expert(first.id, expert_for(first.discipline))
        .await
        .unwrap();

    let foreign = p
        .verification
        .cancel(id, Actor::Seller(SellerId(99)), "not mine".to_string())
        .await;
    assert!(matches!(foreign, Err(EngineError::NotAuthorized(_))));

    let cancelled = p
        .verification
        .cancel(id, Actor::Seller(SELLER), "withdrawn from sale".to_string())
        .await
        .unwrap()
        .value;
    assert_eq!(cancelled.status, VerificationStatus::Cancelled);
    for review in p.panel.panel(id).await.unwrap() {
        assert_eq!(review.status, ExpertReviewStatus::Cancelled);
    }

    // The product is free for a new request once the old one is terminal.
    assert!(
        p.verification
            .request_verification(PRODUCT, 1, SELLER)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_one_active_request_per_product() {
    let h = harness().await;
    let p = &h.platform;

    p.verification
        .request_verification(PRODUCT, 1, SELLER)
        .await
        .unwrap();
    let second = p.verification.request_verification(PRODUCT, 2, SELLER).await;
    assert!(matches!(second, Err(EngineError::AlreadyPending(id)) if id == PRODUCT));

    let bad_level = p.verification.request_verification(PRODUCT, 4, SELLER).await;
    assert!(matches!(bad_level, Err(EngineError::InvalidLevel(4))));

    let unknown = p
        .verification
        .request_verification(ProductId(404), 1, SELLER)
        .await;
    assert!(matches!(unknown, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_basic_level_completes_on_passing_checks() {
    let h = harness().await;
    let p = &h.platform;

    let request = p
        .verification
        .request_verification(PRODUCT, 0, SELLER)
        .await
        .unwrap()
        .value;
    assert_eq!(request.status, VerificationStatus::Completed);
    assert_eq!(request.fee, Money::ZERO);
    assert!(request.automated.as_ref().unwrap().passed());

    let approved = p
        .verification
        .finalize(request.id, ADMIN, Decision::Approved, None)
        .await
        .unwrap();
    assert!(approved.value.badges.contains("basic-checked"));
    // Nobody reviewed it, so nobody earns.
    assert!(!approved
        .events
        .iter()
        .any(|e| matches!(e, DomainEvent::VerifierEarningRecorded { .. })));
}

#[tokio::test]
async fn test_trust_sync_failure_keeps_decision() {
    let h = harness().await;
    let p = &h.platform;
    h.catalog.set_reject_writes(true);

    let id = p
        .verification
        .request_verification(PRODUCT, 0, SELLER)
        .await
        .unwrap()
        .value
        .id;
    let outcome = p
        .verification
        .finalize(id, ADMIN, Decision::Approved, None)
        .await
        .unwrap();
    assert_eq!(outcome.value.status, VerificationStatus::Approved);
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e, DomainEvent::TrustSyncFailed { .. })));
    assert!(h.catalog.trust_of(PRODUCT).await.is_none());

    h.catalog.set_reject_writes(false);
    p.verification.resync_trust(id).await.unwrap();
    let (level, _) = h.catalog.trust_of(PRODUCT).await.unwrap();
    assert_eq!(level, VerificationLevel::BASIC);
}

#[tokio::test]
async fn test_stale_work_is_reported() {
    let h = harness().await;
    let p = &h.platform;

    let request = p
        .verification
        .request_verification(PRODUCT, 2, SELLER)
        .await
        .unwrap()
        .value;
    p.assignment.claim(request.id, LEAD).await.unwrap();

    let fresh = p.detect_stale_work().await.unwrap().value;
    assert!(fresh.assignments.is_empty());
    assert!(fresh.expert_reviews.is_empty());

    h.clock.advance(Duration::hours(80));
    let stale = p.detect_stale_work().await.unwrap();
    assert_eq!(stale.value.assignments.len(), 1);
    assert_eq!(stale.value.expert_reviews.len(), 2);
    assert_eq!(stale.events.len(), 3);

    // Detection only reports; nothing was released.
    let still = p.verification.get(request.id).await.unwrap();
    assert_eq!(still.verifier, Some(LEAD));
}

#[tokio::test]
async fn test_unknown_payout_reference_is_rejected() {
    let h = harness().await;
    let result = h
        .platform
        .apply_transfer_status(
            "XYZ-000001-1-20260101000000",
            TransferStatus::Failed {
                reason: "n/a".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}
