//! Error types for the pitchlens pipeline.
//!
//! Errors are grouped by the stage that raises them, and every group folds
//! into [`PipelineError`], the only error the orchestrator returns:
//!
//! * [`ValidationError`]: upload rejected at the boundary; nothing is stored.
//! * [`ParseError`]: the document cannot be read; fatal to the run.
//! * [`GatewayError`]: an LLM call failed. Whether this is fatal depends on
//!   the caller: the extractor propagates it, the classifier and analyzer
//!   turn it into a degraded result (see [`crate::pipeline::outcome`]).
//! * [`StoreError`]: persistence failed; always fatal.

use thiserror::Error;

/// All fatal errors returned by the orchestrator.
///
/// When a run fails, the `Display` text of this error is stored verbatim as
/// the document's `error_message`.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Upload boundary ───────────────────────────────────────────────────
    /// Upload rejected before any storage write.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Stage failures ────────────────────────────────────────────────────
    /// Parser could not produce pages.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// LLM call failed in a stage without a safe fallback.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The store rejected a read or write.
    #[error(transparent)]
    Persistence(#[from] StoreError),

    // ── Lifecycle ─────────────────────────────────────────────────────────
    /// No document with this identifier exists.
    #[error("Document '{id}' not found")]
    NotFound { id: String },

    /// The requested status change would break the queued → processing →
    /// completed/failed progression.
    #[error("Document '{id}' cannot be processed while {status}: {hint}")]
    InvalidTransition {
        id: String,
        status: String,
        hint: String,
    },

    // ── Configuration ─────────────────────────────────────────────────────
    /// The configured LLM backend cannot be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a background task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Name of the pipeline stage this error belongs to, for audit entries.
    pub fn stage_hint(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "upload",
            PipelineError::Parse(_) => "parse",
            PipelineError::Gateway(_) => "extract",
            PipelineError::Persistence(_) => "persist",
            _ => "processing",
        }
    }
}

/// Upload rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Extension is not one of the allowed deck formats.
    #[error("Invalid file format '{extension}' for '{filename}'. Allowed: {allowed}")]
    UnsupportedExtension {
        filename: String,
        extension: String,
        allowed: String,
    },

    /// File is larger than the configured maximum.
    #[error("File too large: {size_bytes} bytes. Maximum size: {max_mb}MB")]
    FileTooLarge { size_bytes: u64, max_mb: u64 },

    /// Zero-length upload.
    #[error("File '{filename}' is empty")]
    EmptyFile { filename: String },
}

/// Parser failures. Always fatal to the run; no partial parse is accepted.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Content signature is not a supported deck format.
    #[error("Unsupported file type for '{filename}': {detail}")]
    UnsupportedFormat { filename: String, detail: String },

    /// Format recognised but the content is unreadable.
    #[error("Document '{filename}' is corrupt: {detail}")]
    CorruptDocument { filename: String, detail: String },

    /// The PDF engine could not be loaded.
    #[error(
        "PDF engine unavailable: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install libpdfium on the library search path."
    )]
    EngineUnavailable(String),
}

/// Broad cause of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Connection refused, DNS failure, backend down.
    Unreachable,
    /// HTTP 429 or provider quota error.
    RateLimited,
    /// Bad or missing credentials (401/403).
    Auth,
    /// Request exceeded the configured timeout.
    Timeout,
    /// Any other non-success response.
    Api,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorKind::Unreachable => "unreachable",
            ProviderErrorKind::RateLimited => "rate limited",
            ProviderErrorKind::Auth => "authentication failed",
            ProviderErrorKind::Timeout => "timed out",
            ProviderErrorKind::Api => "api error",
        };
        f.write_str(s)
    }
}

/// LLM gateway failures.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Backend unreachable, rate-limited, unauthorised or timed out.
    #[error("LLM backend '{backend}' {kind}: {detail}")]
    Provider {
        backend: String,
        kind: ProviderErrorKind,
        detail: String,
    },

    /// Backend answered, but the text is not JSON after fence stripping.
    #[error("LLM returned malformed JSON: {detail}\nResponse began: {excerpt:?}")]
    MalformedResponse { detail: String, excerpt: String },
}

impl GatewayError {
    /// Shorthand for a provider failure.
    pub fn provider(backend: impl Into<String>, kind: ProviderErrorKind, detail: impl Into<String>) -> Self {
        GatewayError::Provider {
            backend: backend.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// `true` for failures a retry may fix: rate limits, timeouts and an
    /// unreachable backend. Auth, API and malformed-response errors are not
    /// retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Provider {
                kind: ProviderErrorKind::RateLimited
                    | ProviderErrorKind::Timeout
                    | ProviderErrorKind::Unreachable,
                ..
            }
        )
    }
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored record '{key}' could not be (de)serialised: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
