//! Parser output: pages/slides with raw text and layout blocks.

use super::document::DocumentKind;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in the source document's native units
/// (PDF points, or EMU for PPTX).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build from an origin plus extent.
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Title,
    Body,
    Table,
}

/// Text or tabular content of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockPayload {
    Text(String),
    Table(Vec<Vec<String>>),
}

impl BlockPayload {
    /// Flatten to text; table cells are tab-separated, rows newline-separated.
    pub fn to_text(&self) -> String {
        match self {
            BlockPayload::Text(s) => s.clone(),
            BlockPayload::Table(rows) => rows
                .iter()
                .map(|row| row.join("\t"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One typed layout block on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub payload: BlockPayload,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

/// One page or slide. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPage {
    /// 1-based ordinal.
    pub number: u32,
    pub raw_text: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}

impl ParsedPage {
    /// A page with text only and no layout blocks.
    pub fn from_text(number: u32, raw_text: impl Into<String>) -> Self {
        Self {
            number,
            raw_text: raw_text.into(),
            blocks: Vec::new(),
        }
    }
}

/// Full parser output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub kind: DocumentKind,
    /// Engine that produced the pages, e.g. `"pdfium"` or `"ooxml"`.
    pub extraction_method: String,
    pub pages: Vec<ParsedPage>,
}

impl ParsedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_payload_flattens() {
        let p = BlockPayload::Table(vec![
            vec!["Year".into(), "Revenue".into()],
            vec!["2024".into(), "1.2M".into()],
        ]);
        assert_eq!(p.to_text(), "Year\tRevenue\n2024\t1.2M");
    }

    #[test]
    fn bbox_from_origin_size() {
        let b = BoundingBox::from_origin_size(10.0, 20.0, 5.0, 2.5);
        assert_eq!(b, BoundingBox::new(10.0, 20.0, 15.0, 22.5));
    }
}
