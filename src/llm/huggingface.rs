//! Hugging Face text-generation inference backend
//!
//! Text-generation endpoints take a single prompt string, so the role-tagged
//! history is flattened into a `System:/Human:/Assistant:` transcript.

use super::types::{LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::error::body_excerpt;
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_MODEL: &str = "EleutherAI/gpt-neo-2.7B";

/// Turn prefix the model tends to hallucinate after its own answer
const HUMAN_PREFIX: &str = "Human:";

pub struct HuggingFaceService {
    client: Client,
    api_key: String,
    endpoint: String,
    model_id: String,
}

impl HuggingFaceService {
    pub fn new(
        api_key: String,
        model: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let endpoint = format!(
            "{}/{model}",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
        );

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model_id: format!("huggingface/{model}"),
        })
    }

    fn translate_request(request: &LlmRequest) -> HfRequest {
        HfRequest {
            inputs: build_transcript(&request.messages),
            parameters: HfParameters {
                max_new_tokens: request.max_tokens,
                temperature: request.temperature,
                do_sample: true,
                return_full_text: false,
            },
        }
    }
}

/// Flatten messages into a transcript ending with an open assistant turn
pub fn build_transcript(messages: &[LlmMessage]) -> String {
    let mut transcript = String::new();
    for msg in messages {
        let prefix = match msg.role {
            MessageRole::System => "System:",
            MessageRole::User => HUMAN_PREFIX,
            MessageRole::Assistant => "Assistant:",
        };
        transcript.push_str(prefix);
        transcript.push(' ');
        transcript.push_str(&msg.content);
        transcript.push('\n');
    }
    transcript.push_str("Assistant:");
    transcript
}

/// Keep only the assistant's own turn
fn clean_generated_text(text: &str) -> String {
    text.split(HUMAN_PREFIX)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn normalize_response(body: &str) -> Result<LlmResponse, LlmError> {
    let generations: Vec<HfGeneration> = serde_json::from_str(body).map_err(|e| {
        LlmError::malformed(format!(
            "Invalid response format from API: {e} - body: {}",
            body_excerpt(body)
        ))
    })?;

    let first = generations
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::malformed("Invalid response format from API: empty list"))?;

    Ok(LlmResponse {
        text: clean_generated_text(&first.generated_text),
        usage: Usage::default(),
    })
}

#[async_trait]
impl LlmService for HuggingFaceService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let hf_request = Self::translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&hf_request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(LlmError::network(
                "Model is loading. Please wait a moment and try again.",
            ));
        }

        if !status.is_success() {
            let message = serde_json::from_str::<HfErrorResponse>(&body)
                .map_or(body, |resp| resp.error);
            return Err(LlmError::from_status(status, &message));
        }

        normalize_response(&body)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Hugging Face API types

#[derive(Debug, Serialize)]
struct HfRequest {
    inputs: String,
    parameters: HfParameters,
}

#[derive(Debug, Serialize)]
struct HfParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct HfGeneration {
    #[serde(default)]
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct HfErrorResponse {
    error: String,
}
