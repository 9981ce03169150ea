use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::llm::types::PredictionRequest;

/// A vision-language model that proposes the next action.
///
/// Returns the raw completion text, reasoning block included. Implementations
/// must report a timed-out call as
/// [`PilotError::PredictionTimeout`](crate::errors::PilotError::PredictionTimeout)
/// and an unreachable or failing endpoint as
/// [`PilotError::PredictionUnreachable`](crate::errors::PilotError::PredictionUnreachable).
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    async fn predict(&self, request: &PredictionRequest) -> PilotResult<String>;
}
