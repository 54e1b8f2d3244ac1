//! Text-generation backend abstraction
//!
//! Provides a common interface over the hosted chat-completion API, hosted
//! text-generation inference, and the local inference runtime.

mod error;
mod huggingface;
mod ollama;
mod openai;
mod registry;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use huggingface::HuggingFaceService;
pub use ollama::OllamaService;
pub use openai::OpenAIService;
pub use registry::{BackendKind, LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for text-generation backends
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Run one generation: `history` plus `instruction` as a trailing system
/// message. Blank output is reported as malformed rather than returned.
pub async fn generate(
    service: &dyn LlmService,
    history: &[LlmMessage],
    instruction: &str,
    params: &GenerationParams,
) -> Result<String, LlmError> {
    let request = LlmRequest::with_instruction(history, instruction, params);
    let response = service.complete(&request).await?;
    let text = response.text.trim();
    if text.is_empty() {
        return Err(LlmError::malformed("Backend returned an empty response"));
    }
    Ok(text.to_string())
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
