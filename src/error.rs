use crate::domain::ids::{ProductId, VerifierId};
use crate::domain::payout::Payee;
use crate::domain::money::Currency;
use thiserror::Error;

/// Coarse classification of [`EngineError`], used by callers to decide whether
/// to fix input, re-read and retry, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; nothing was applied.
    Validation,
    /// Workflow ordering or a lost race; re-read before deciding.
    StateConflict,
    /// A collaborator (provider, product catalog) failed.
    External,
    /// Storage or serialization failure.
    Internal,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("verification level {0} is outside 0-3")]
    InvalidLevel(u8),
    #[error("product {0} already has an active verification request")]
    AlreadyPending(ProductId),
    #[error("verifier {0} is not assigned to this task")]
    NotAssignedToCaller(VerifierId),
    #[error("task is already assigned to verifier {0}")]
    AlreadyAssigned(VerifierId),
    #[error("task was claimed by another verifier")]
    AlreadyClaimed,
    #[error("expert panel reviews are still outstanding")]
    NotReadyForDecision,
    #[error("an existing payout period for {0} overlaps the requested range")]
    OverlappingPeriod(Payee),
    #[error("payout destination is incomplete: missing {0}")]
    IncompletePayoutDestination(String),
    #[error("net payout {0} is not positive")]
    NonPositivePayout(i64),
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },
    #[error("{entity} {id} cannot {action} while {status}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        status: String,
        action: &'static str,
    },
    #[error("record was modified concurrently: {0}")]
    ConcurrentModification(String),
    #[error("verifier {0} is not eligible for this task")]
    NotEligible(VerifierId),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("payment provider error: {0}")]
    ProviderError(String),
    #[error("product catalog error: {0}")]
    CatalogError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::InvalidLevel(_)
            | EngineError::IncompletePayoutDestination(_)
            | EngineError::NonPositivePayout(_)
            | EngineError::CurrencyMismatch { .. }
            | EngineError::NotEligible(_)
            | EngineError::NotAuthorized(_)
            | EngineError::NotFound(_)
            | EngineError::ValidationError(_)
            | EngineError::ConfigError(_)
            | EngineError::CsvError(_) => ErrorClass::Validation,
            EngineError::AlreadyPending(_)
            | EngineError::NotAssignedToCaller(_)
            | EngineError::AlreadyAssigned(_)
            | EngineError::AlreadyClaimed
            | EngineError::NotReadyForDecision
            | EngineError::OverlappingPeriod(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::ConcurrentModification(_) => ErrorClass::StateConflict,
            EngineError::ProviderError(_) | EngineError::CatalogError(_) => ErrorClass::External,
            EngineError::IoError(_) | EngineError::InternalError(_) => ErrorClass::Internal,
            #[cfg(feature = "storage-rocksdb")]
            EngineError::RocksDbError(_) => ErrorClass::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        EngineError::ValidationError(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
