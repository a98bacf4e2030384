//! Text extraction and normalization for uploaded documents.
//!
//! Exactly one media type is accepted: paginated-text documents
//! (`application/pdf`). Anything else fails with `UnsupportedFormat` before
//! any bytes are touched. Extracted text is normalized to plain UTF-8 with
//! page and section boundaries kept as blank-line soft markers, which the
//! chunker then windows over.

use crate::error::{Error, Result};

/// The one supported media type.
pub const MIME_PDF: &str = "application/pdf";

/// Extract normalized plain text from an uploaded document.
///
/// A corrupt document, an empty upload, or extraction yielding only
/// whitespace all fail with `IngestionFailed`; the knowledge store is never
/// touched on failure.
pub fn extract_text(bytes: &[u8], media_type: &str) -> Result<String> {
    match media_type {
        MIME_PDF => extract_pdf(bytes),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::IngestionFailed("document is empty".to_string()));
    }
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::IngestionFailed(format!("PDF extraction failed: {}", e)))?;
    let text = normalize(&raw);
    if text.is_empty() {
        return Err(Error::IngestionFailed(
            "document contains no extractable text".to_string(),
        ));
    }
    Ok(text)
}

/// Normalize extracted text: unify line endings, turn form feeds (page
/// breaks) into paragraph breaks, drop control characters, trim trailing
/// whitespace per line, and collapse blank-line runs into single soft
/// markers.
pub fn normalize(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut iter = raw.chars().peekable();
    while let Some(c) = iter.next() {
        match c {
            '\r' => {
                if iter.peek() == Some(&'\n') {
                    iter.next();
                }
                cleaned.push('\n');
            }
            // Form feed is how page boundaries surface in extracted text.
            '\u{0C}' => cleaned.push_str("\n\n"),
            '\t' => cleaned.push(' '),
            '\n' => cleaned.push('\n'),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut pending_blank = false;
    for line in cleaned.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        pending_blank = false;
        out.push_str(line);
    }
    out
}
