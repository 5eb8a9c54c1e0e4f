//! LLM gateway: one object in front of whichever model backs the pipeline.
//!
//! Stages never talk to a provider directly. They hold an [`LlmGateway`],
//! built once from configuration and cloned cheaply, and ask it for either
//! free text ([`LlmGateway::generate_text`]) or a JSON value
//! ([`LlmGateway::generate_json`]).
//!
//! ## Retry Strategy
//!
//! Transient failures (rate limits, timeouts, unreachable backend) are
//! retried with exponential backoff `retry_backoff_ms * 2^(attempt-1)`.
//! Authentication errors, API errors and malformed JSON are returned at once;
//! whether they are fatal is the calling stage's decision.

pub mod hosted;
pub mod json;
pub mod mock;
pub mod ollama;

use crate::config::{BackendConfig, PipelineConfig};
use crate::error::{GatewayError, PipelineError};
use crate::prompts::JSON_ONLY_INSTRUCTION;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

pub use hosted::HostedBackend;
pub use mock::ScriptedBackend;
pub use ollama::OllamaBackend;

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A language model that turns a prompt into text.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend family, e.g. `"gemini"` or `"ollama"`.
    fn name(&self) -> &str;

    /// Model identifier sent to the backend.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GatewayError>;
}

/// Shared handle to the configured backend plus retry policy.
#[derive(Clone)]
pub struct LlmGateway {
    backend: Arc<dyn LlmBackend>,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmGateway")
            .field("backend", &self.backend.name())
            .field("model", &self.backend.model())
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LlmGateway {
    /// Wrap a backend with the default retry policy.
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            backend,
            max_tokens: defaults.max_tokens,
            max_retries: defaults.max_retries,
            retry_backoff_ms: defaults.retry_backoff_ms,
        }
    }

    /// Construct the backend named by `config.backend`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let backend: Arc<dyn LlmBackend> = match &config.backend {
            BackendConfig::Hosted { provider, model } => Arc::new(HostedBackend::connect(
                provider,
                model,
                Duration::from_secs(config.api_timeout_secs),
            )?),
            BackendConfig::Local {
                base_url,
                model,
                timeout_secs,
            } => Arc::new(OllamaBackend::new(
                base_url,
                model,
                Duration::from_secs(*timeout_secs),
            )?),
        };
        Ok(Self::new(backend)
            .with_max_tokens(config.max_tokens)
            .with_retry(config.max_retries, config.retry_backoff_ms))
    }

    pub fn with_retry(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Free-text completion with retry on transient failures.
    pub async fn generate_text(&self, prompt: &str, temperature: f32) -> Result<String, GatewayError> {
        let options = GenerationOptions {
            temperature,
            max_tokens: self.max_tokens,
        };
        let start = Instant::now();
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.backend.name(),
                    attempt,
                    self.max_retries,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            match self.backend.complete(prompt, &options).await {
                Ok(text) => {
                    debug!(
                        "{}/{}: {} prompt chars → {} completion chars in {:?}",
                        self.backend.name(),
                        self.backend.model(),
                        prompt.len(),
                        text.len(),
                        start.elapsed()
                    );
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!("{}: attempt {} failed: {}", self.backend.name(), attempt + 1, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// JSON completion: appends the JSON-only instruction, then strips code
    /// fences and parses the reply.
    pub async fn generate_json(&self, prompt: &str, temperature: f32) -> Result<Value, GatewayError> {
        let full_prompt = format!("{prompt}\n\n{JSON_ONLY_INSTRUCTION}");
        let text = self.generate_text(&full_prompt, temperature).await?;
        json::parse_completion(&text).inspect_err(|e| {
            warn!("{}: {}", self.backend.name(), e);
        })
    }
}
