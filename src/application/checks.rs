//! Level 0 automated checks, run synchronously when a free request is filed.

use crate::config::AutomatedCheckConfig;
use crate::domain::ports::ProductInfo;
use crate::domain::verification::{AutomatedReport, CheckOutcome};
use chrono::{DateTime, Utc};
use std::path::Path;

fn outcome(name: &str, passed: bool, detail: impl FnOnce() -> String) -> CheckOutcome {
    CheckOutcome {
        name: name.to_string(),
        passed,
        detail: (!passed).then(detail),
    }
}

pub fn run_basic_checks(
    product: &ProductInfo,
    limits: &AutomatedCheckConfig,
    now: DateTime<Utc>,
) -> AutomatedReport {
    let artifact = &product.artifact;
    let extension = artifact
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let checks = vec![
        outcome("title_present", !product.title.trim().is_empty(), || {
            "product title is blank".to_string()
        }),
        outcome("artifact_present", artifact.file_name.is_some(), || {
            "no artifact uploaded".to_string()
        }),
        outcome(
            "file_type",
            extension
                .as_deref()
                .is_some_and(|ext| limits.allowed_extensions.iter().any(|a| a == ext)),
            || format!("extension {extension:?} is not accepted"),
        ),
        outcome(
            "file_size",
            artifact.size_bytes > 0 && artifact.size_bytes <= limits.max_artifact_bytes,
            || {
                format!(
                    "{} bytes is outside 1..={}",
                    artifact.size_bytes, limits.max_artifact_bytes
                )
            },
        ),
        outcome(
            "description",
            artifact.description.trim().chars().count() >= limits.min_description_chars,
            || {
                format!(
                    "description shorter than {} characters",
                    limits.min_description_chars
                )
            },
        ),
    ];

    AutomatedReport { checks, ran_at: now }
}
