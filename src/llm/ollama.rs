//! Local inference runtime backend (Ollama `/api/chat`)

use super::types::{LlmMessage, LlmRequest, LlmResponse, Usage};
use super::error::body_excerpt;
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "tinyllama";

pub struct OllamaService {
    client: Client,
    model: String,
    endpoint: String,
    model_id: String,
}

impl OllamaService {
    pub fn new(model: String, base_url: Option<&str>, timeout: Duration) -> Result<Self, LlmError> {
        let endpoint = format!(
            "{}/api/chat",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
        );

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            model_id: format!("ollama/{model}"),
            model,
            endpoint,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(translate_message).collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    fn normalize_response(resp: OllamaResponse) -> LlmResponse {
        LlmResponse {
            text: resp.message.content.trim().to_string(),
            usage: Usage {
                input_tokens: resp.prompt_eval_count.unwrap_or(0),
                output_tokens: resp.eval_count.unwrap_or(0),
            },
        }
    }
}

fn translate_message(msg: &LlmMessage) -> OllamaMessage {
    OllamaMessage {
        role: msg.role.as_str().to_string(),
        content: msg.content.clone(),
    }
}

#[async_trait]
impl LlmService for OllamaService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let ollama_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaErrorResponse>(&body)
                .map_or(body, |resp| resp.error);
            return Err(LlmError::from_status(status, &message));
        }

        let ollama_response: OllamaResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!(
                "Failed to parse response: {e} - body: {}",
                body_excerpt(&body)
            ))
        })?;

        Ok(Self::normalize_response(ollama_response))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}
