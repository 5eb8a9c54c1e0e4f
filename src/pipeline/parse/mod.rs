//! Parser stage: document bytes → pages.
//!
//! The format is decided by the content signature, never by the filename.
//! A `.pdf` upload that is really a PPTX is parsed as PPTX (with a warning);
//! bytes with no known signature are rejected.

pub mod pdf;
pub mod pptx;
pub mod text;

use crate::error::ParseError;
use crate::model::{DocumentKind, ParsedDocument};
use crate::upload::extension_of;
use async_trait::async_trait;
use tracing::warn;

/// Turns raw document bytes into pages.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError>;
}

/// The default parser: sniff, then PDF via pdfium or PPTX via OOXML.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeckParser;

fn leading_bytes(bytes: &[u8]) -> String {
    let head: Vec<String> = bytes.iter().take(8).map(|b| format!("{b:02X}")).collect();
    if head.is_empty() {
        "no content".into()
    } else {
        format!("leading bytes {}", head.join(" "))
    }
}

#[async_trait]
impl DocumentParser for DeckParser {
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError> {
        let sniffed = DocumentKind::sniff(bytes).ok_or_else(|| ParseError::UnsupportedFormat {
            filename: filename.to_string(),
            detail: format!("not a PDF or PPTX signature ({})", leading_bytes(bytes)),
        })?;

        let declared = extension_of(filename).and_then(|e| DocumentKind::from_extension(&e));
        if let Some(declared) = declared.filter(|d| *d != sniffed) {
            warn!(
                "{}: extension says {}, content is {}; parsing as {}",
                filename, declared, sniffed, sniffed
            );
        }

        let doc = match sniffed {
            DocumentKind::Pdf => pdf::parse_pdf(bytes, filename).await?,
            DocumentKind::Pptx => pptx::parse_pptx(bytes, filename).await?,
            DocumentKind::LegacyPpt => {
                return Err(ParseError::UnsupportedFormat {
                    filename: filename.to_string(),
                    detail: "binary PowerPoint (.ppt) is not supported; save the deck as .pptx or .pdf"
                        .into(),
                })
            }
        };

        if doc.pages.is_empty() {
            return Err(ParseError::CorruptDocument {
                filename: filename.to_string(),
                detail: "document has no pages".into(),
            });
        }
        Ok(doc)
    }
}
