//! PDF text layer via pdfium.
//!
//! pdfium is a C++ library with process-global state; every call here runs
//! inside `spawn_blocking` and binds the library for the duration of one
//! document.

use super::text::normalize_page_text;
use crate::error::ParseError;
use crate::model::{
    BlockKind, BlockPayload, BoundingBox, ContentBlock, DocumentKind, ParsedDocument, ParsedPage,
};
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Segments set in a font larger than this are treated as titles.
pub const TITLE_FONT_SIZE: f32 = 18.0;

pub const EXTRACTION_METHOD: &str = "pdfium";

/// Bind pdfium from `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library search path.
fn bind_pdfium() -> Result<Pdfium, ParseError> {
    let mut attempts = Vec::new();

    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        let candidate = if std::path::Path::new(&path).is_dir() {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
        } else {
            Pdfium::bind_to_library(&path)
        };
        match candidate {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(e) => attempts.push(format!("PDFIUM_LIB_PATH={path}: {e:?}")),
        }
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => attempts.push(format!("./: {e:?}")),
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            attempts.push(format!("system: {e:?}"));
            ParseError::EngineUnavailable(attempts.join("; "))
        })
}

#[allow(deprecated)]
/// Segments set larger than [`TITLE_FONT_SIZE`] are titles.
fn kind_for_font_size(font_size: Option<f32>) -> BlockKind {
    match font_size {
        Some(size) if size > TITLE_FONT_SIZE => BlockKind::Title,
        _ => BlockKind::Body,
    }
}

fn bbox_of(rect: &PdfRect) -> BoundingBox {
    BoundingBox::new(
        rect.left.value as f64,
        rect.bottom.value as f64,
        rect.right.value as f64,
        rect.top.value as f64,
    )
}

/// Parse PDF bytes into pages.
pub async fn parse_pdf(bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError> {
    let owned = bytes.to_vec();
    let name = filename.to_string();
    tokio::task::spawn_blocking(move || parse_pdf_blocking(&owned, &name))
        .await
        .map_err(|e| ParseError::CorruptDocument {
            filename: filename.to_string(),
            detail: format!("PDF parse task panicked: {e}"),
        })?
}

fn parse_pdf_blocking(bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError> {
    let pdfium = bind_pdfium()?;
    let corrupt = |detail: String| ParseError::CorruptDocument {
        filename: filename.to_string(),
        detail,
    };

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| corrupt(format!("{e:?}")))?;

    let pages = document.pages();
    info!("{}: PDF loaded, {} pages", filename, pages.len());

    let mut parsed = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let number = idx as u32 + 1;
        let text = page
            .text()
            .map_err(|e| corrupt(format!("page {number}: {e:?}")))?;

        let mut blocks = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let font_size = segment
                .chars()
                .ok()
                .and_then(|chars| chars.iter().next().map(|c| c.unscaled_font_size().value));
            blocks.push(ContentBlock {
                kind: kind_for_font_size(font_size),
                payload: BlockPayload::Text(content),
                bbox: bbox_of(&segment.bounds()),
                font_size,
            });
        }

        let raw_text = normalize_page_text(&text.all());
        debug!(
            "{}: page {} → {} chars, {} blocks",
            filename,
            number,
            raw_text.len(),
            blocks.len()
        );
        parsed.push(ParsedPage {
            number,
            raw_text,
            blocks,
        });
    }

    Ok(ParsedDocument {
        kind: DocumentKind::Pdf,
        extraction_method: EXTRACTION_METHOD.to_string(),
        pages: parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_segments_are_titles() {
        assert_eq!(kind_for_font_size(Some(28.0)), BlockKind::Title);
        assert_eq!(kind_for_font_size(Some(TITLE_FONT_SIZE)), BlockKind::Body);
        assert_eq!(kind_for_font_size(Some(11.0)), BlockKind::Body);
        assert_eq!(kind_for_font_size(None), BlockKind::Body);
    }
}
