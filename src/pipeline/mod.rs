//! Pipeline stages for pitch-deck analysis.
//!
//! Each submodule implements exactly one transformation step and is
//! testable on its own with a [`crate::gateway::ScriptedBackend`].
//!
//! ## Data Flow
//!
//! ```text
//! parse ──▶ classify ──▶ extract ──▶ analyze
//! (bytes)   (sections)   (fields)    (signals)
//! ```
//!
//! 1. [`parse`]: sniff the container and pull per-page text and blocks;
//!    pdfium runs in `spawn_blocking` because it is not async-safe
//! 2. [`classify`]: label pages with deck sections; degrades to a single
//!    `unclassified` assignment on failure
//! 3. [`extract`]: structured fields with per-field confidence; the only
//!    LLM stage whose failure fails the run
//! 4. [`analyze`]: green/red/yellow flags and a recommendation; degrades to
//!    an empty analysis on failure

pub mod analyze;
pub mod classify;
pub mod extract;
pub mod outcome;
pub mod parse;

pub use analyze::Analyzer;
pub use classify::Classifier;
pub use extract::{overall_confidence, Extractor};
pub use outcome::StageOutcome;
pub use parse::{DeckParser, DocumentParser};
