use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use haggle_core::ports::{CollaboratorError, ReasoningRequest, ReasoningService};

use crate::llm::LlmClient;

const SERVICE: &str = "reasoning";

/// Adapts any [`LlmClient`] to the workflow's reasoning port.
pub struct LlmReasoningService {
    client: Arc<dyn LlmClient>,
}

impl LlmReasoningService {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningService for LlmReasoningService {
    async fn invoke(&self, request: ReasoningRequest) -> Result<String, CollaboratorError> {
        debug!(
            event_name = "reasoning.invoke",
            task = request.task.as_str(),
            prompt_chars = request.prompt.len(),
            "invoking reasoning model"
        );
        self.client
            .complete(&request.system, &request.prompt)
            .await
            .map_err(|error| CollaboratorError::unavailable(SERVICE, format!("{error:#}")))
    }
}
