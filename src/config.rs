//! Configuration types for the extraction pipeline.
//!
//! Every stage knob lives in [`PipelineConfig`], built through
//! [`PipelineConfig::builder()`] or loaded with [`PipelineConfig::from_env()`].
//! The choice of LLM backend is a separate [`BackendConfig`] value carried
//! inside it; switching between a hosted API and a local model server is a
//! configuration change only.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default upload limit: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 50;
/// Hosted provider used when `LLM_PROVIDER` is unset.
pub const DEFAULT_PROVIDER: &str = "gemini";
/// Hosted model used when `LLM_MODEL` is unset.
pub const DEFAULT_HOSTED_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";
/// Local backend request timeout.
pub const DEFAULT_LOCAL_TIMEOUT_SECS: u64 = 120;

/// Which language model backs the gateway.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// A hosted API reached through `edgequake-llm` (gemini, openai,
    /// anthropic, ...). The API key is read from the provider's usual
    /// environment variable.
    Hosted { provider: String, model: String },
    /// An Ollama-compatible HTTP server.
    Local {
        base_url: String,
        model: String,
        timeout_secs: u64,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Hosted {
            provider: DEFAULT_PROVIDER.into(),
            model: DEFAULT_HOSTED_MODEL.into(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Hosted { provider, model } => f
                .debug_struct("Hosted")
                .field("provider", provider)
                .field("model", model)
                .finish(),
            BackendConfig::Local {
                base_url,
                model,
                timeout_secs,
            } => f
                .debug_struct("Local")
                .field("base_url", base_url)
                .field("model", model)
                .field("timeout_secs", timeout_secs)
                .finish(),
        }
    }
}

impl BackendConfig {
    /// Read `LLM_PROVIDER`, `LLM_MODEL`, `OLLAMA_URL`, `OLLAMA_MODEL` and
    /// `OLLAMA_TIMEOUT_SECS` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| get(k).filter(|v| !v.trim().is_empty());
        let provider = get("LLM_PROVIDER")
            .map(|p| p.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        match provider.as_str() {
            "ollama" | "local" => BackendConfig::Local {
                base_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
                model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into()),
                timeout_secs: get("OLLAMA_TIMEOUT_SECS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(DEFAULT_LOCAL_TIMEOUT_SECS),
            },
            _ => BackendConfig::Hosted {
                model: get("LLM_MODEL").unwrap_or_else(|| default_model_for(&provider).into()),
                provider,
            },
        }
    }

    pub fn model(&self) -> &str {
        match self {
            BackendConfig::Hosted { model, .. } | BackendConfig::Local { model, .. } => model,
        }
    }

    /// Short backend name for logs and audit metadata.
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::Hosted { provider, .. } => provider,
            BackendConfig::Local { .. } => "ollama",
        }
    }
}

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4.1-mini",
        "anthropic" => "claude-3-5-haiku-latest",
        _ => DEFAULT_HOSTED_MODEL,
    }
}

/// Pipeline configuration.
///
/// # Example
/// ```rust
/// use pitchlens::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_upload_mb(20)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // ── Upload boundary ──────────────────────────────────────────────────
    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: u64,

    /// Accepted lowercase extensions. Default: `pdf`, `ppt`, `pptx`.
    pub allowed_extensions: Vec<String>,

    // ── Classifier ───────────────────────────────────────────────────────
    /// Characters of each page shown to the classifier. Default: 500.
    pub classifier_page_chars: usize,

    /// Total character budget of the classifier's slide listing. Default: 8000.
    pub classifier_budget_chars: usize,

    /// Confidence of the fallback "unclassified" assignment. Default: 0.3.
    pub classifier_fallback_confidence: f64,

    /// Default: 0.3.
    pub classifier_temperature: f32,

    // ── Extractor ────────────────────────────────────────────────────────
    /// Character budget of the document text in the extraction prompt.
    /// Default: 12000.
    pub extractor_budget_chars: usize,

    /// Default: 0.3.
    pub extractor_temperature: f32,

    // ── Analyzer ─────────────────────────────────────────────────────────
    /// Character budget of the serialised extraction in the analysis prompt.
    /// Default: 8000.
    pub analyzer_budget_chars: usize,

    /// Default: 0.3.
    pub analyzer_temperature: f32,

    // ── Gateway ──────────────────────────────────────────────────────────
    /// Maximum tokens per completion. Default: 4096.
    pub max_tokens: usize,

    /// Retries after a transient backend failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay; doubles on every attempt. Default: 500 ms.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for hosted providers. Default: 120 s.
    pub api_timeout_secs: u64,

    pub backend: BackendConfig,

    // ── Runs ─────────────────────────────────────────────────────────────
    /// Documents processed at once by [`crate::stream`]. Default: 4.
    pub concurrency: usize,

    /// Recorded on every persisted result. Default: the crate version.
    pub schema_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            allowed_extensions: vec!["pdf".into(), "ppt".into(), "pptx".into()],
            classifier_page_chars: 500,
            classifier_budget_chars: 8000,
            classifier_fallback_confidence: 0.3,
            classifier_temperature: 0.3,
            extractor_budget_chars: 12_000,
            extractor_temperature: 0.3,
            analyzer_budget_chars: 8000,
            analyzer_temperature: 0.3,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            backend: BackendConfig::default(),
            concurrency: 4,
            schema_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("classifier_budget_chars", &self.classifier_budget_chars)
            .field("extractor_budget_chars", &self.extractor_budget_chars)
            .field("analyzer_budget_chars", &self.analyzer_budget_chars)
            .field("max_retries", &self.max_retries)
            .field("backend", &self.backend)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overridden from the environment.
    ///
    /// Loads an optional `.env` file first, then reads the backend variables
    /// (see [`BackendConfig::from_env`]) and `MAX_FILE_SIZE_MB`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source and
    /// no `.env` loading.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut builder = Self::builder().backend(BackendConfig::from_lookup(&get));
        if let Some(raw) = get("MAX_FILE_SIZE_MB") {
            let mb: u64 = raw.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("MAX_FILE_SIZE_MB must be an integer, got '{raw}'"))
            })?;
            if mb.checked_mul(1024 * 1024).is_none() {
                return Err(PipelineError::InvalidConfig(format!(
                    "MAX_FILE_SIZE_MB is too large: {mb}"
                )));
            }
            builder = builder.max_upload_mb(mb);
        }
        builder.build()
    }

    /// `max_upload_bytes` rounded down to whole MiB, for messages.
    pub fn max_upload_mb(&self) -> u64 {
        self.max_upload_bytes / (1024 * 1024)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_upload_mb(mut self, mb: u64) -> Self {
        self.config.max_upload_bytes = mb.max(1).saturating_mul(1024 * 1024);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn classifier_page_chars(mut self, n: usize) -> Self {
        self.config.classifier_page_chars = n.max(1);
        self
    }

    pub fn classifier_budget_chars(mut self, n: usize) -> Self {
        self.config.classifier_budget_chars = n.max(1);
        self
    }

    pub fn classifier_fallback_confidence(mut self, c: f64) -> Self {
        self.config.classifier_fallback_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn classifier_temperature(mut self, t: f32) -> Self {
        self.config.classifier_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn extractor_budget_chars(mut self, n: usize) -> Self {
        self.config.extractor_budget_chars = n.max(1);
        self
    }

    pub fn extractor_temperature(mut self, t: f32) -> Self {
        self.config.extractor_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn analyzer_budget_chars(mut self, n: usize) -> Self {
        self.config.analyzer_budget_chars = n.max(1);
        self
    }

    pub fn analyzer_temperature(mut self, t: f32) -> Self {
        self.config.analyzer_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn schema_version(mut self, v: impl Into<String>) -> Self {
        self.config.schema_version = v.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(PipelineError::InvalidConfig(
                "Maximum upload size must be > 0".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one upload extension must be allowed".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.classifier_page_chars > c.classifier_budget_chars {
            return Err(PipelineError::InvalidConfig(format!(
                "Classifier per-page limit ({}) exceeds its total budget ({})",
                c.classifier_page_chars, c.classifier_budget_chars
            )));
        }
        if let BackendConfig::Local { base_url, .. } = &c.backend {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(PipelineError::InvalidConfig(format!(
                    "Local backend URL must start with http:// or https://, got '{base_url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(c.classifier_fallback_confidence, 0.3);
        assert_eq!(c.classifier_budget_chars, 8000);
        assert_eq!(c.extractor_budget_chars, 12_000);
        assert_eq!(c.concurrency, 4);
        assert_eq!(
            c.backend,
            BackendConfig::Hosted {
                provider: "gemini".into(),
                model: "gemini-2.0-flash".into()
            }
        );
    }

    #[test]
    fn builder_clamps() {
        let c = PipelineConfig::builder()
            .concurrency(0)
            .classifier_fallback_confidence(4.0)
            .allowed_extensions([".PDF"])
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.classifier_fallback_confidence, 1.0);
        assert_eq!(c.allowed_extensions, vec!["pdf"]);
    }

    #[test]
    fn build_rejects_bad_local_url() {
        let err = PipelineConfig::builder()
            .backend(BackendConfig::Local {
                base_url: "localhost:11434".into(),
                model: "m".into(),
                timeout_secs: 5,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn env_selects_local_backend() {
        let b = BackendConfig::from_lookup(lookup(&[
            ("LLM_PROVIDER", "Ollama"),
            ("OLLAMA_MODEL", "mistral"),
            ("OLLAMA_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(
            b,
            BackendConfig::Local {
                base_url: DEFAULT_OLLAMA_URL.into(),
                model: "mistral".into(),
                timeout_secs: 30
            }
        );
        assert_eq!(b.name(), "ollama");
    }

    #[test]
    fn env_hosted_model_override() {
        let b = BackendConfig::from_lookup(lookup(&[("LLM_PROVIDER", "openai"), ("LLM_MODEL", "gpt-4o")]));
        assert_eq!(b.model(), "gpt-4o");
        assert_eq!(b.name(), "openai");
    }

    #[test]
    fn env_max_file_size() {
        let c = PipelineConfig::from_lookup(lookup(&[("MAX_FILE_SIZE_MB", "10")])).unwrap();
        assert_eq!(c.max_upload_mb(), 10);
        let err = PipelineConfig::from_lookup(lookup(&[("MAX_FILE_SIZE_MB", "ten")])).unwrap_err();
        assert!(err.to_string().contains("MAX_FILE_SIZE_MB"));
    }

    #[test]
    fn env_max_file_size_overflow_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("MAX_FILE_SIZE_MB", "18446744073709551615")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn builder_upload_limit_saturates() {
        let c = PipelineConfig::builder().max_upload_mb(u64::MAX).build().unwrap();
        assert_eq!(c.max_upload_bytes, u64::MAX);
    }
}
