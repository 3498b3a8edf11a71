use crate::domain::ports::{ExplanationGenerator, GenerationRequest};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;

/// Generator used when natural-language explanations are disabled.
///
/// Every request fails immediately, so callers always take their
/// deterministic rule-based path.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGenerator;

#[async_trait]
impl ExplanationGenerator for OfflineGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(PaymentError::ExplanationError(
            "explanation generation is disabled".to_string(),
        ))
    }
}
