use crate::domain::fee::{FeeSplit, VerificationLevel};
use crate::domain::ids::{AdminId, ProductId, SellerId, VerificationId, VerifierId};
use crate::domain::money::{Currency, Money};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Approved,
    Rejected,
    Cancelled,
}

impl VerificationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VerificationStatus::Approved
                | VerificationStatus::Rejected
                | VerificationStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Assigned => "ASSIGNED",
            VerificationStatus::InProgress => "IN_PROGRESS",
            VerificationStatus::Completed => "COMPLETED",
            VerificationStatus::Approved => "APPROVED",
            VerificationStatus::Rejected => "REJECTED",
            VerificationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Rejected,
}

/// A reviewer's verdict, advisory to the admin's final [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Reject,
}

/// Who performed an action, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Seller(SellerId),
    Admin(AdminId),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Seller(id) => write!(f, "seller:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub admin: AdminId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub actor: Actor,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

/// Level 0 manual fallback, used when automated checks did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicReport {
    pub metadata_accurate: bool,
    pub content_appropriate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalReport {
    pub runs_as_described: bool,
    pub documentation_complete: bool,
    pub tested_environments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub functional: FunctionalReport,
    pub credentials_handled_safely: bool,
    pub external_endpoints: Vec<String>,
    pub vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelLeadReport {
    pub security: SecurityReport,
    pub summary: String,
}

/// Findings recorded by the lead reviewer. Each level has its own shape so the
/// fields a level requires cannot be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReport {
    Basic(BasicReport),
    Functional(FunctionalReport),
    Security(SecurityReport),
    PanelLead(PanelLeadReport),
}

impl ReviewReport {
    pub fn level(&self) -> VerificationLevel {
        match self {
            ReviewReport::Basic(_) => VerificationLevel::BASIC,
            ReviewReport::Functional(_) => VerificationLevel::FUNCTIONAL,
            ReviewReport::Security(_) => VerificationLevel::SECURITY,
            ReviewReport::PanelLead(_) => VerificationLevel::EXPERT,
        }
    }

    fn functional(&self) -> Option<&FunctionalReport> {
        match self {
            ReviewReport::Basic(_) => None,
            ReviewReport::Functional(report) => Some(report),
            ReviewReport::Security(report) => Some(&report.functional),
            ReviewReport::PanelLead(report) => Some(&report.security.functional),
        }
    }

    fn security(&self) -> Option<&SecurityReport> {
        match self {
            ReviewReport::Security(report) => Some(report),
            ReviewReport::PanelLead(report) => Some(&report.security),
            _ => None,
        }
    }

    /// Badges earned by the findings themselves, on top of the level badge.
    pub fn badges(&self) -> BTreeSet<String> {
        let mut badges = BTreeSet::new();
        if let Some(functional) = self.functional() {
            if functional.documentation_complete {
                badges.insert("documented".to_string());
            }
            if functional.tested_environments.len() > 1 {
                badges.insert("multi-environment".to_string());
            }
        }
        if let Some(security) = self.security()
            && security.credentials_handled_safely
            && security.vulnerabilities.is_empty()
        {
            badges.insert("no-known-vulnerabilities".to_string());
        }
        badges
    }

    fn validate(&self) -> Result<()> {
        if let ReviewReport::PanelLead(report) = self
            && report.summary.trim().is_empty()
        {
            return Err(EngineError::validation("panel lead report needs a summary"));
        }
        Ok(())
    }
}

/// Badge granted for passing verification at a level.
pub fn level_badge(level: VerificationLevel) -> &'static str {
    match level.value() {
        0 => "basic-checked",
        1 => "functionally-verified",
        2 => "security-reviewed",
        _ => "expert-verified",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

/// Result of the synchronous level 0 checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatedReport {
    pub checks: Vec<CheckOutcome>,
    pub ran_at: DateTime<Utc>,
}

impl AutomatedReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn score(&self) -> u8 {
        if self.checks.is_empty() {
            return 0;
        }
        let passed = self.checks.iter().filter(|c| c.passed).count();
        ((passed * 100) / self.checks.len()) as u8
    }
}

/// What a verifier hands in when finishing a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub score: u8,
    pub recommendation: Recommendation,
    pub comments: String,
    pub report: ReviewReport,
}

impl ReviewSubmission {
    pub fn validate(&self, level: VerificationLevel) -> Result<()> {
        if self.score > 100 {
            return Err(EngineError::validation(format!(
                "score {} is outside 0-100",
                self.score
            )));
        }
        if self.recommendation == Recommendation::Reject && self.comments.trim().is_empty() {
            return Err(EngineError::validation(
                "comments are required when recommending rejection",
            ));
        }
        if self.report.level() != level {
            return Err(EngineError::validation(format!(
                "level {} report submitted for a level {level} request",
                self.report.level()
            )));
        }
        self.report.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: VerificationId,
    pub product: ProductId,
    pub seller: SellerId,
    pub level: VerificationLevel,
    pub status: VerificationStatus,
    pub verifier: Option<VerifierId>,
    pub fee: Money,
    pub platform_share: Money,
    pub verifier_share: Money,
    pub currency: Currency,
    pub report: Option<ReviewReport>,
    pub automated: Option<AutomatedReport>,
    pub score: Option<u8>,
    pub recommendation: Option<Recommendation>,
    pub reviewer_comments: Option<String>,
    pub badges: BTreeSet<String>,
    pub requested_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub decision: Option<DecisionRecord>,
    pub cancellation: Option<CancellationRecord>,
    /// Bumped by the store on every successful conditional write.
    pub version: u64,
}

impl VerificationRequest {
    pub fn new(
        id: VerificationId,
        product: ProductId,
        seller: SellerId,
        level: VerificationLevel,
        split: FeeSplit,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product,
            seller,
            level,
            status: VerificationStatus::Pending,
            verifier: None,
            fee: split.fee,
            platform_share: split.platform,
            verifier_share: split.verifier,
            currency,
            report: None,
            automated: None,
            score: None,
            recommendation: None,
            reviewer_comments: None,
            badges: BTreeSet::new(),
            requested_at: now,
            assigned_at: None,
            started_at: None,
            reviewed_at: None,
            completed_at: None,
            decision: None,
            cancellation: None,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    fn ensure(&self, allowed: &[VerificationStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                entity: "verification",
                id: self.id.to_string(),
                status: self.status.to_string(),
                action,
            })
        }
    }

    fn ensure_assignee(&self, verifier: VerifierId) -> Result<()> {
        if self.verifier == Some(verifier) {
            Ok(())
        } else {
            Err(EngineError::NotAssignedToCaller(verifier))
        }
    }

    /// Binds a verifier; `PENDING → ASSIGNED`.
    pub fn assign(&mut self, verifier: VerifierId, now: DateTime<Utc>) -> Result<()> {
        if let Some(current) = self.verifier {
            return Err(EngineError::AlreadyAssigned(current));
        }
        self.ensure(&[VerificationStatus::Pending], "be assigned")?;
        self.verifier = Some(verifier);
        self.assigned_at = Some(now);
        self.status = VerificationStatus::Assigned;
        Ok(())
    }

    /// Releases the caller's claim before work starts; `ASSIGNED → PENDING`.
    pub fn release(&mut self, verifier: VerifierId) -> Result<()> {
        self.ensure(&[VerificationStatus::Assigned], "be released")?;
        self.ensure_assignee(verifier)?;
        self.verifier = None;
        self.assigned_at = None;
        self.status = VerificationStatus::Pending;
        Ok(())
    }

    pub fn start(&mut self, verifier: VerifierId, now: DateTime<Utc>) -> Result<()> {
        self.ensure(&[VerificationStatus::Assigned], "start review")?;
        self.ensure_assignee(verifier)?;
        self.started_at = Some(now);
        self.status = VerificationStatus::InProgress;
        Ok(())
    }

    pub fn complete_review(
        &mut self,
        verifier: VerifierId,
        submission: ReviewSubmission,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure(&[VerificationStatus::InProgress], "submit review")?;
        self.ensure_assignee(verifier)?;
        submission.validate(self.level)?;
        self.score = Some(submission.score);
        self.recommendation = Some(submission.recommendation);
        self.reviewer_comments = Some(submission.comments);
        self.report = Some(submission.report);
        self.reviewed_at = Some(now);
        self.status = VerificationStatus::Completed;
        Ok(())
    }

    /// Attaches level 0 check results. A passing report completes the request
    /// without a human reviewer; a failing one leaves it pending.
    pub fn record_automated(&mut self, report: AutomatedReport, now: DateTime<Utc>) -> Result<()> {
        self.ensure(&[VerificationStatus::Pending], "record automated checks")?;
        if report.passed() {
            self.score = Some(report.score());
            self.recommendation = Some(Recommendation::Approve);
            self.reviewed_at = Some(now);
            self.status = VerificationStatus::Completed;
        }
        self.automated = Some(report);
        Ok(())
    }

    pub fn finalize(
        &mut self,
        admin: AdminId,
        decision: Decision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure(&[VerificationStatus::Completed], "finalize")?;
        let comment = comment.filter(|c| !c.trim().is_empty());
        if decision == Decision::Rejected && comment.is_none() {
            return Err(EngineError::validation("a reason is required to reject"));
        }
        if decision == Decision::Approved {
            self.badges.insert(level_badge(self.level).to_string());
            if let Some(report) = &self.report {
                self.badges.extend(report.badges());
            }
        }
        self.status = match decision {
            Decision::Approved => VerificationStatus::Approved,
            Decision::Rejected => VerificationStatus::Rejected,
        };
        self.completed_at = Some(now);
        self.decision = Some(DecisionRecord {
            admin,
            decision,
            comment,
            decided_at: now,
        });
        Ok(())
    }

    pub fn cancel(&mut self, actor: Actor, reason: String, now: DateTime<Utc>) -> Result<()> {
        self.ensure(
            &[
                VerificationStatus::Pending,
                VerificationStatus::Assigned,
                VerificationStatus::InProgress,
            ],
            "be cancelled",
        )?;
        if reason.trim().is_empty() {
            return Err(EngineError::validation("a cancellation reason is required"));
        }
        self.status = VerificationStatus::Cancelled;
        self.cancellation = Some(CancellationRecord {
            actor,
            reason,
            cancelled_at: now,
        });
        Ok(())
    }
}
