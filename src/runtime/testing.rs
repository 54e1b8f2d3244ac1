//! Mock implementations for testing
//!
//! These mocks enable driving sessions without a real backend.

use super::traits::LlmClient;
use crate::llm::{LlmError, LlmMessage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One call made against the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub history: Vec<LlmMessage>,
    pub instruction: String,
}

/// Mock LLM client that returns queued replies
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<RecordedRequest>>,
    /// Simulated backend latency
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Mock that takes `delay` to answer each request
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, text: impl Into<String>) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    /// Queue an error
    pub fn queue_error(&self, error: LlmError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn pending_replies(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        history: &[LlmMessage],
        instruction: &str,
    ) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            history: history.to_vec(),
            instruction: instruction.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
