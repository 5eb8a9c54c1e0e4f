//! PPTX slides from the OOXML parts inside the zip container.
//!
//! Only the text-bearing parts of DrawingML are read: shapes (`<p:sp>`) and
//! table graphic frames (`<p:graphicFrame>` holding `<a:tbl>`). Positions
//! are kept in EMU.

use super::text::normalize_page_text;
use crate::error::ParseError;
use crate::model::{
    BlockKind, BlockPayload, BoundingBox, ContentBlock, DocumentKind, ParsedDocument, ParsedPage,
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::io::{Cursor, Read};
use tracing::{debug, info};
use zip::ZipArchive;

pub const EXTRACTION_METHOD: &str = "ooxml";

static RE_SLIDE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

static RE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<p:sp\b.*?</p:sp>|<p:graphicFrame\b.*?</p:graphicFrame>").unwrap()
});

static RE_TITLE_PH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<p:ph\b[^>]*\btype="(?:title|ctrTitle)""#).unwrap());

static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:p(?:\s[^>]*)?>(.*?)</a:p>").unwrap());

static RE_RUN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").unwrap());

static RE_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<a:off\s+x="(-?\d+)"\s+y="(-?\d+)""#).unwrap());

static RE_EXTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<a:ext\s+cx="(\d+)"\s+cy="(\d+)""#).unwrap());

static RE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<a:tr\b.*?</a:tr>").unwrap());

static RE_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<a:tc\b.*?</a:tc>").unwrap());

static RE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").unwrap());

/// Decode the five predefined XML entities and numeric character references.
pub fn decode_entities(s: &str) -> String {
    RE_ENTITY
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if name.starts_with("#x") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ => name[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Text of the paragraphs in `xml`, one line per non-empty paragraph.
fn paragraphs(xml: &str) -> Vec<String> {
    RE_PARAGRAPH
        .captures_iter(xml)
        .map(|p| {
            RE_RUN_TEXT
                .captures_iter(&p[1])
                .map(|t| decode_entities(&t[1]))
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect()
}

fn bbox_of(xml: &str) -> BoundingBox {
    let num = |c: &Captures, i: usize| c[i].parse::<f64>().unwrap_or(0.0);
    let (x, y) = RE_OFFSET
        .captures(xml)
        .map(|c| (num(&c, 1), num(&c, 2)))
        .unwrap_or_default();
    let (w, h) = RE_EXTENT
        .captures(xml)
        .map(|c| (num(&c, 1), num(&c, 2)))
        .unwrap_or_default();
    BoundingBox::from_origin_size(x, y, w, h)
}

/// Blocks of one slide, in document order.
pub fn slide_blocks(xml: &str) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for shape in RE_SHAPE.find_iter(xml) {
        let shape = shape.as_str();
        let bbox = bbox_of(shape);

        if shape.starts_with("<p:graphicFrame") {
            if !shape.contains("<a:tbl") {
                continue;
            }
            let rows: Vec<Vec<String>> = RE_ROW
                .find_iter(shape)
                .map(|row| {
                    RE_CELL
                        .find_iter(row.as_str())
                        .map(|cell| paragraphs(cell.as_str()).join(" "))
                        .collect()
                })
                .filter(|row: &Vec<String>| !row.is_empty())
                .collect();
            if !rows.is_empty() {
                blocks.push(ContentBlock {
                    kind: BlockKind::Table,
                    payload: BlockPayload::Table(rows),
                    bbox,
                    font_size: None,
                });
            }
            continue;
        }

        let lines = paragraphs(shape);
        if lines.is_empty() {
            continue;
        }
        let kind = if RE_TITLE_PH.is_match(shape) {
            BlockKind::Title
        } else {
            BlockKind::Body
        };
        blocks.push(ContentBlock {
            kind,
            payload: BlockPayload::Text(lines.join("\n")),
            bbox,
            font_size: None,
        });
    }
    blocks
}

/// Parse PPTX bytes into slides.
pub async fn parse_pptx(bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError> {
    let owned = bytes.to_vec();
    let name = filename.to_string();
    tokio::task::spawn_blocking(move || parse_pptx_blocking(&owned, &name))
        .await
        .map_err(|e| ParseError::CorruptDocument {
            filename: filename.to_string(),
            detail: format!("PPTX parse task panicked: {e}"),
        })?
}

pub(crate) fn parse_pptx_blocking(bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError> {
    let corrupt = |detail: String| ParseError::CorruptDocument {
        filename: filename.to_string(),
        detail,
    };

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(format!("unreadable zip: {e}")))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            RE_SLIDE_NAME
                .captures(name)
                .and_then(|c| c[1].parse::<u32>().ok())
                .map(|n| (n, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(n, _)| *n);

    if slides.is_empty() {
        return Err(corrupt("archive contains no ppt/slides/slideN.xml parts".into()));
    }
    info!("{}: PPTX archive, {} slides", filename, slides.len());

    let mut pages = Vec::with_capacity(slides.len());
    for (ordinal, (_, part)) in slides.iter().enumerate() {
        let mut xml = String::new();
        archive
            .by_name(part)
            .map_err(|e| corrupt(format!("{part}: {e}")))?
            .read_to_string(&mut xml)
            .map_err(|e| corrupt(format!("{part}: {e}")))?;

        let blocks = slide_blocks(&xml);
        let raw_text = normalize_page_text(
            &blocks
                .iter()
                .map(|b| b.payload.to_text())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let number = ordinal as u32 + 1;
        debug!("{}: slide {} → {} blocks", filename, number, blocks.len());
        pages.push(ParsedPage {
            number,
            raw_text,
            blocks,
        });
    }

    Ok(ParsedDocument {
        kind: DocumentKind::Pptx,
        extraction_method: EXTRACTION_METHOD.to_string(),
        pages,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// A minimal slide part with a title shape and a body shape.
    pub fn slide_xml(title: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
<p:spPr><a:xfrm><a:off x="457200" y="274638"/><a:ext cx="8229600" cy="1143000"/></a:xfrm></p:spPr>
<p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="en-US"/><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
<p:spPr><a:xfrm><a:off x="457200" y="1600200"/><a:ext cx="8229600" cy="4525963"/></a:xfrm></p:spPr>
<p:txBody><a:bodyPr/><a:p><a:r><a:t xml:space="preserve">{body}</a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
        )
    }

    /// Zip the given slide parts (1-based, in order) into a PPTX container.
    pub fn pptx(slides: &[String]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", opts).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("ppt/presentation.xml", opts).unwrap();
        zip.write_all(b"<p:presentation/>").unwrap();
        // Written in reverse to check ordering by slide number.
        for (i, xml) in slides.iter().enumerate().rev() {
            zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), opts)
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}
