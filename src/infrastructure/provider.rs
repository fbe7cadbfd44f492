use crate::domain::payout::TransferRequest;
use crate::domain::ports::PaymentProvider;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Accepts every transfer and hands back a synthetic provider reference.
///
/// Used by the CLI and tests in place of a real banking integration. It can
/// be switched into a failing mode to exercise the `FAILED` payout path.
#[derive(Default, Clone)]
pub struct SimulatedPaymentProvider {
    submitted: Arc<RwLock<Vec<TransferRequest>>>,
    declining: Arc<AtomicBool>,
}

impl SimulatedPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_declining(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    pub async fn submitted(&self) -> Vec<TransferRequest> {
        self.submitted.read().await.clone()
    }
}

#[async_trait]
impl PaymentProvider for SimulatedPaymentProvider {
    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<String> {
        if self.declining.load(Ordering::SeqCst) {
            return Err(EngineError::ProviderError(format!(
                "transfer {} declined",
                request.reference
            )));
        }
        let mut submitted = self.submitted.write().await;
        submitted.push(request.clone());
        let provider_reference = format!("SIM-{:08}", submitted.len());
        debug!(reference = %request.reference, %provider_reference, "simulated transfer accepted");
        Ok(provider_reference)
    }
}
