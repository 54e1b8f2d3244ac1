//! Backend registry: builds the configured text-generation backends

use super::{
    huggingface, ollama, openai, HuggingFaceService, LlmError, LlmService, LoggingService,
    OllamaService, OpenAIService,
};
use crate::config::parse_value;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const TIMEOUT_ENV: &str = "SKILVYN_REQUEST_TIMEOUT_SECS";

/// Which adapter handles generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendKind {
    OpenAI,
    HuggingFace,
    Ollama,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::OpenAI => "openai",
            BackendKind::HuggingFace => "huggingface",
            BackendKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAI),
            "huggingface" | "hf" => Ok(BackendKind::HuggingFace),
            "ollama" | "local" => Ok(BackendKind::Ollama),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Configuration for text-generation backends
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Explicit backend choice; otherwise the first one with credentials
    pub backend: Option<BackendKind>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub huggingface_base_url: Option<String>,
    pub huggingface_model: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let backend = std::env::var("SKILVYN_BACKEND").ok().and_then(|v| {
            v.parse()
                .map_err(|e: String| tracing::warn!(error = %e, "Ignoring SKILVYN_BACKEND"))
                .ok()
        });

        Self {
            backend,
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_base_url: non_empty_env("OPENAI_BASE_URL"),
            openai_model: non_empty_env("OPENAI_MODEL"),
            huggingface_api_key: non_empty_env("HUGGINGFACE_API_KEY"),
            huggingface_base_url: non_empty_env("HUGGINGFACE_BASE_URL"),
            huggingface_model: non_empty_env("HUGGINGFACE_MODEL"),
            ollama_url: non_empty_env("OLLAMA_URL"),
            ollama_model: non_empty_env("OLLAMA_MODEL"),
            request_timeout: std::env::var(TIMEOUT_ENV)
                .ok()
                .and_then(|raw| parse_timeout(&raw)),
        }
    }

    fn timeout(&self) -> Duration {
        self.request_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

/// Whole seconds, at least one; anything else is logged and ignored
fn parse_timeout(raw: &str) -> Option<Duration> {
    parse_value::<NonZeroU64>(TIMEOUT_ENV, raw).map(|secs| Duration::from_secs(secs.get()))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Registry of available backends
pub struct ModelRegistry {
    services: BTreeMap<BackendKind, Arc<dyn LlmService>>,
    default_backend: BackendKind,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Self {
        let mut services: BTreeMap<BackendKind, Arc<dyn LlmService>> = BTreeMap::new();

        for kind in [BackendKind::OpenAI, BackendKind::HuggingFace, BackendKind::Ollama] {
            match Self::try_create_backend(kind, config) {
                Some(Ok(service)) => {
                    services.insert(kind, Arc::new(LoggingService::new(service)));
                }
                Some(Err(e)) => {
                    tracing::warn!(backend = %kind, error = %e, "Failed to create backend");
                }
                None => {}
            }
        }

        // Explicit choice wins; otherwise prefer hosted backends with credentials
        // and fall back to the local runtime, which needs none.
        let default_backend = config
            .backend
            .or_else(|| services.keys().next().copied())
            .unwrap_or(BackendKind::Ollama);

        Self {
            services,
            default_backend,
        }
    }

    /// Build a backend if its prerequisites are configured
    fn try_create_backend(
        kind: BackendKind,
        config: &LlmConfig,
    ) -> Option<Result<Arc<dyn LlmService>, LlmError>> {
        let timeout = config.timeout();
        let service: Result<Arc<dyn LlmService>, LlmError> = match kind {
            BackendKind::OpenAI => {
                let api_key = config.openai_api_key.clone()?;
                let model = config
                    .openai_model
                    .clone()
                    .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
                OpenAIService::new(api_key, model, config.openai_base_url.as_deref(), timeout)
                    .map(|s| Arc::new(s) as Arc<dyn LlmService>)
            }
            BackendKind::HuggingFace => {
                let api_key = config.huggingface_api_key.clone()?;
                let model = config
                    .huggingface_model
                    .as_deref()
                    .unwrap_or(huggingface::DEFAULT_MODEL);
                HuggingFaceService::new(
                    api_key,
                    model,
                    config.huggingface_base_url.as_deref(),
                    timeout,
                )
                .map(|s| Arc::new(s) as Arc<dyn LlmService>)
            }
            BackendKind::Ollama => {
                // The local runtime is only registered implicitly when nothing
                // hosted is configured, or when asked for by name.
                let wanted = config.backend == Some(BackendKind::Ollama)
                    || config.ollama_url.is_some()
                    || config.ollama_model.is_some()
                    || (config.openai_api_key.is_none() && config.huggingface_api_key.is_none());
                if !wanted {
                    return None;
                }
                let model = config
                    .ollama_model
                    .clone()
                    .unwrap_or_else(|| ollama::DEFAULT_MODEL.to_string());
                OllamaService::new(model, config.ollama_url.as_deref(), timeout)
                    .map(|s| Arc::new(s) as Arc<dyn LlmService>)
            }
        };
        Some(service)
    }

    /// Get a backend by kind
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn LlmService>> {
        self.services.get(&kind).cloned()
    }

    /// Get the selected backend
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(self.default_backend)
    }

    pub fn default_backend(&self) -> BackendKind {
        self.default_backend
    }

    /// List all available backends
    pub fn available_backends(&self) -> Vec<BackendKind> {
        self.services.keys().copied().collect()
    }
}
