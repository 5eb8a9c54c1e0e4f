//! Hosted LLM APIs through `edgequake-llm`.

use super::{GenerationOptions, LlmBackend};
use crate::error::{GatewayError, PipelineError, ProviderErrorKind};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Environment variables that hold the API key of well-known providers.
fn key_vars(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "azure" => &["AZURE_OPENAI_API_KEY"],
        _ => &[],
    }
}

/// A provider created by `ProviderFactory`, one user message per call.
pub struct HostedBackend {
    provider_name: String,
    model: String,
    provider: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl HostedBackend {
    /// Create the named provider. Fails with a hint when its API key is not
    /// set or the factory rejects the name.
    pub fn connect(provider: &str, model: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let vars = key_vars(provider);
        if !vars.is_empty()
            && !vars
                .iter()
                .any(|v| std::env::var(v).map(|k| !k.trim().is_empty()).unwrap_or(false))
        {
            return Err(PipelineError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: format!(
                    "Set {} in the environment or a .env file, or use LLM_PROVIDER=ollama for a local model.",
                    vars.join(" or ")
                ),
            });
        }
        let llm = ProviderFactory::create_llm_provider(provider, model).map_err(|e| {
            PipelineError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::with_provider(provider, model, llm, timeout))
    }

    /// Wrap an already constructed provider.
    pub fn with_provider(
        provider_name: &str,
        model: &str,
        provider: Arc<dyn LLMProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            model: model.to_string(),
            provider,
            timeout,
        }
    }
}

/// Map provider error text onto a [`ProviderErrorKind`].
pub fn classify_provider_error(detail: &str) -> ProviderErrorKind {
    let d = detail.to_ascii_lowercase();
    if d.contains("429") || d.contains("rate limit") || d.contains("rate_limit") || d.contains("quota") {
        ProviderErrorKind::RateLimited
    } else if d.contains("401")
        || d.contains("403")
        || d.contains("unauthorized")
        || d.contains("permission")
        || d.contains("api key")
        || d.contains("api_key")
    {
        ProviderErrorKind::Auth
    } else if d.contains("timed out") || d.contains("timeout") {
        ProviderErrorKind::Timeout
    } else if d.contains("connect") || d.contains("dns") || d.contains("unreachable") {
        ProviderErrorKind::Unreachable
    } else {
        ProviderErrorKind::Api
    }
}

#[async_trait]
impl LlmBackend for HostedBackend {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GatewayError> {
        let messages = vec![ChatMessage::user_with_images(prompt, Vec::new())];
        let opts = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&opts));
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(GatewayError::provider(
                &self.provider_name,
                ProviderErrorKind::Timeout,
                format!("no response within {}s", self.timeout.as_secs()),
            )),
            Ok(Err(e)) => {
                let detail = e.to_string();
                Err(GatewayError::provider(
                    &self.provider_name,
                    classify_provider_error(&detail),
                    detail,
                ))
            }
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.provider_name, response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_provider_errors() {
        assert_eq!(
            classify_provider_error("HTTP 429 Too Many Requests"),
            ProviderErrorKind::RateLimited
        );
        assert_eq!(
            classify_provider_error("Invalid API key provided"),
            ProviderErrorKind::Auth
        );
        assert_eq!(
            classify_provider_error("request timed out"),
            ProviderErrorKind::Timeout
        );
        assert_eq!(
            classify_provider_error("error trying to connect: dns error"),
            ProviderErrorKind::Unreachable
        );
        assert_eq!(
            classify_provider_error("500 internal server error"),
            ProviderErrorKind::Api
        );
    }

    #[test]
    fn known_providers_have_key_vars() {
        assert!(key_vars("gemini").contains(&"GEMINI_API_KEY"));
        assert!(key_vars("openai").contains(&"OPENAI_API_KEY"));
        assert!(key_vars("some-proxy").is_empty());
    }
}
