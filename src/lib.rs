//! # pitchlens
//!
//! Extract structured investment data and signals from startup pitch decks
//! using Large Language Models.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PPTX
//!  │
//!  ├─ 0. Upload    extension + size checks, document stored as Queued
//!  ├─ 1. Parse     per-slide text and layout blocks (pdfium / OOXML)
//!  ├─ 2. Classify  slides → 11 deck sections        (degrades on failure)
//!  ├─ 3. Extract   sections → typed fields + confidence   (fatal on failure)
//!  ├─ 4. Analyze   fields → flags, risks, recommendation  (degrades on failure)
//!  └─ 5. Persist   versioned result bundle + audit trail
//! ```
//!
//! Every stage boundary writes `started` / `completed` (or `failed`) audit
//! entries, so a document's history can be replayed from the store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pitchlens::{LlmGateway, MemoryStore, Orchestrator, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backend from LLM_PROVIDER / LLM_MODEL / OLLAMA_URL (plus .env)
//!     let config = PipelineConfig::from_env()?;
//!     let gateway = LlmGateway::from_config(&config)?;
//!     let orch = Orchestrator::new(Arc::new(MemoryStore::new()), gateway, config);
//!
//!     let bytes = std::fs::read("deck.pdf")?;
//!     let doc = orch.ingest(&bytes, "deck.pdf").await?;
//!     let bundle = orch.process(&doc.id).await?;
//!     println!("confidence {:.2}", bundle.confidence.overall);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pitchlens` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## Backends
//!
//! | `LLM_PROVIDER` | Backend | Needs |
//! |----------------|---------|-------|
//! | `gemini` (default) | hosted, `gemini-2.0-flash` | `GEMINI_API_KEY` |
//! | `openai` / `anthropic` / `mistral` | hosted | provider API key |
//! | `ollama` / `local` | local server, `llama3.1:8b` | `OLLAMA_URL` reachable |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod stream;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::AuditLog;
pub use config::{BackendConfig, PipelineConfig, PipelineConfigBuilder};
pub use error::{
    GatewayError, ParseError, PipelineError, ProviderErrorKind, StoreError, ValidationError,
};
pub use gateway::{LlmBackend, LlmGateway, ScriptedBackend};
pub use model::{
    AuditEntry, AuditStatus, Classification, Document, DocumentKind, DocumentStatus,
    ExtractedData, InvestmentAnalysis, OutputBundle, ParsedDocument, ParsedPage, ResultRecord,
    SectionCategory, SectionMap,
};
pub use orchestrator::Orchestrator;
pub use pipeline::{DeckParser, DocumentParser, StageOutcome};
pub use progress::{NoopObserver, PipelineObserver, SharedObserver};
pub use store::{FsStore, MemoryStore, Store};
pub use stream::{process_all, process_stream, RunReport};
