use crate::domain::fee::VerificationLevel;
use crate::domain::ids::{ExpertReviewId, VerificationId, VerifierId};
use crate::domain::verification::Recommendation;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Area of expertise a panel sub-review covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    Design,
    Planning,
    Development,
    Domain,
}

impl Discipline {
    pub const ALL: [Discipline; 4] = [
        Discipline::Design,
        Discipline::Planning,
        Discipline::Development,
        Discipline::Domain,
    ];

    /// Disciplines whose sign-off a level needs before a decision.
    pub fn required_for(level: VerificationLevel) -> &'static [Discipline] {
        match level.value() {
            2 => &[Discipline::Development, Discipline::Domain],
            3 => &Self::ALL,
            _ => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Discipline::Design => "design",
            Discipline::Planning => "planning",
            Discipline::Development => "development",
            Discipline::Domain => "domain",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a panel sub-review. A reduced form of the parent's status set:
/// sub-reviews have no admin decision of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpertReviewStatus {
    Pending,
    Assigned,
    InProgress,
    Reviewed,
    Cancelled,
}

impl ExpertReviewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExpertReviewStatus::Reviewed | ExpertReviewStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpertReviewStatus::Pending => "PENDING",
            ExpertReviewStatus::Assigned => "ASSIGNED",
            ExpertReviewStatus::InProgress => "IN_PROGRESS",
            ExpertReviewStatus::Reviewed => "REVIEWED",
            ExpertReviewStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExpertReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertFindings {
    pub score: u8,
    pub recommendation: Recommendation,
    pub comments: String,
}

impl ExpertFindings {
    pub fn validate(&self) -> Result<()> {
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
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertReview {
    pub id: ExpertReviewId,
    pub request: VerificationId,
    /// Level of the parent request; fixes which disciplines the panel needs.
    pub level: VerificationLevel,
    pub discipline: Discipline,
    pub expert: Option<VerifierId>,
    pub status: ExpertReviewStatus,
    pub findings: Option<ExpertFindings>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl ExpertReview {
    pub fn new(
        id: ExpertReviewId,
        request: VerificationId,
        level: VerificationLevel,
        discipline: Discipline,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request,
            level,
            discipline,
            expert: None,
            status: ExpertReviewStatus::Pending,
            findings: None,
            created_at: now,
            assigned_at: None,
            started_at: None,
            reviewed_at: None,
            version: 0,
        }
    }

    fn ensure(&self, allowed: &[ExpertReviewStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                entity: "expert review",
                id: self.id.to_string(),
                status: self.status.to_string(),
                action,
            })
        }
    }

    fn ensure_assignee(&self, expert: VerifierId) -> Result<()> {
        if self.expert == Some(expert) {
            Ok(())
        } else {
            Err(EngineError::NotAssignedToCaller(expert))
        }
    }

    pub fn assign(&mut self, expert: VerifierId, now: DateTime<Utc>) -> Result<()> {
        if let Some(current) = self.expert {
            return Err(EngineError::AlreadyAssigned(current));
        }
        self.ensure(&[ExpertReviewStatus::Pending], "be assigned")?;
        self.expert = Some(expert);
        self.assigned_at = Some(now);
        self.status = ExpertReviewStatus::Assigned;
        Ok(())
    }

    pub fn release(&mut self, expert: VerifierId) -> Result<()> {
        self.ensure(&[ExpertReviewStatus::Assigned], "be released")?;
        self.ensure_assignee(expert)?;
        self.expert = None;
        self.assigned_at = None;
        self.status = ExpertReviewStatus::Pending;
        Ok(())
    }

    pub fn start(&mut self, expert: VerifierId, now: DateTime<Utc>) -> Result<()> {
        self.ensure(&[ExpertReviewStatus::Assigned], "start review")?;
        self.ensure_assignee(expert)?;
        self.started_at = Some(now);
        self.status = ExpertReviewStatus::InProgress;
        Ok(())
    }

    pub fn submit(
        &mut self,
        expert: VerifierId,
        findings: ExpertFindings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure(&[ExpertReviewStatus::InProgress], "submit review")?;
        self.ensure_assignee(expert)?;
        findings.validate()?;
        self.findings = Some(findings);
        self.reviewed_at = Some(now);
        self.status = ExpertReviewStatus::Reviewed;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.ensure(
            &[
                ExpertReviewStatus::Pending,
                ExpertReviewStatus::Assigned,
                ExpertReviewStatus::InProgress,
            ],
            "be cancelled",
        )?;
        self.status = ExpertReviewStatus::Cancelled;
        Ok(())
    }

    /// Unassigned and older than `threshold` as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.status == ExpertReviewStatus::Pending && now - self.created_at > threshold
    }
}

/// True when every discipline `level` requires has a `REVIEWED` sub-review
/// in `reviews`. A missing sub-review counts as outstanding.
pub fn panel_complete(level: VerificationLevel, reviews: &[ExpertReview]) -> bool {
    Discipline::required_for(level).iter().all(|discipline| {
        reviews
            .iter()
            .any(|r| r.discipline == *discipline && r.status == ExpertReviewStatus::Reviewed)
    })
}
