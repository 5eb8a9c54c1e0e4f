//! Local model server speaking the Ollama `/api/generate` protocol.

use super::{GenerationOptions, LlmBackend};
use crate::error::{GatewayError, PipelineError, ProviderErrorKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaBackend {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    fn error(&self, kind: ProviderErrorKind, detail: impl Into<String>) -> GatewayError {
        GatewayError::provider("ollama", kind, detail)
    }

    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            self.error(
                ProviderErrorKind::Timeout,
                format!("no response within {}s", self.timeout.as_secs()),
            )
        } else if e.is_connect() {
            self.error(
                ProviderErrorKind::Unreachable,
                format!("{} ({e})", self.base_url),
            )
        } else {
            self.error(ProviderErrorKind::Api, e.to_string())
        }
    }
}

fn status_kind(status: StatusCode) -> ProviderErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Auth,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => ProviderErrorKind::Unreachable,
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => ProviderErrorKind::Timeout,
        _ => ProviderErrorKind::Api,
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GatewayError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.error(status_kind(status), format!("HTTP {status}: {body}")));
        }

        let body: GenerateResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                self.error(ProviderErrorKind::Api, format!("unexpected response body: {e}"))
            }
        })?;
        Ok(body.response)
    }
}
