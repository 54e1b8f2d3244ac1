//! Trait abstractions for runtime I/O
//!
//! The executor only talks to the backend through [`LlmClient`], so tests can
//! drive whole sessions with a scripted client.

use crate::llm::{self, BackendKind, GenerationParams, LlmError, LlmMessage, ModelRegistry};
use async_trait::async_trait;
use std::sync::Arc;

/// Client for text generation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate one reply for `history` steered by `instruction`
    async fn generate(&self, history: &[LlmMessage], instruction: &str)
        -> Result<String, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn generate(
        &self,
        history: &[LlmMessage],
        instruction: &str,
    ) -> Result<String, LlmError> {
        (**self).generate(history, instruction).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use `ModelRegistry` as `LlmClient`
pub struct RegistryLlmClient {
    registry: Arc<ModelRegistry>,
    backend: BackendKind,
    params: GenerationParams,
    model_id: String,
}

impl RegistryLlmClient {
    pub fn new(registry: Arc<ModelRegistry>, params: GenerationParams) -> Self {
        let backend = registry.default_backend();
        let model_id = registry
            .get(backend)
            .map_or_else(|| backend.to_string(), |s| s.model_id().to_string());
        Self {
            registry,
            backend,
            params,
            model_id,
        }
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn generate(
        &self,
        history: &[LlmMessage],
        instruction: &str,
    ) -> Result<String, LlmError> {
        let service = self.registry.get(self.backend).ok_or_else(|| {
            LlmError::network(format!(
                "Text generation backend '{}' is not configured",
                self.backend
            ))
        })?;
        llm::generate(service.as_ref(), history, instruction, &self.params).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
