// src/utils/text.rs
//! Text helpers shared by the exchange clients and the content materializer.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{node::Node, ElementRef, Html, Selector};

use crate::utils::error::{ConvertError, FetchError};

// --- Regex Patterns (Lazy Static) ---
// JSONP wrapper returned by the HKEX prefix search, e.g. `callback({...});\n`
static CALLBACK_ENVELOPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*callback\((.*)\);?\s*$").expect("Failed to compile CALLBACK_ENVELOPE_RE")
});

// Page numbers glued to the preceding Han character by the PDF text layer: `年报12 `
static PAGE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{Han})\d{2}\s+").expect("Failed to compile PAGE_MARKER_RE")
});

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to compile BODY_SELECTOR")
});

/// Strips a `callback(...);` envelope from a response body.
/// Bodies that are not wrapped are returned unchanged.
pub fn unwrap_callback(body: &str) -> Result<&str, FetchError> {
    let trimmed = body.trim();
    if !trimmed.starts_with("callback(") {
        return Ok(trimmed);
    }
    CALLBACK_ENVELOPE_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| FetchError::Parse("unterminated callback envelope".to_string()))
}

/// Decodes HTML entities (`&amp;`, `&#39;`, ...) into their characters.
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Removes digit-pair page markers that follow a Han character.
pub fn strip_page_markers(text: &str) -> String {
    PAGE_MARKER_RE.replace_all(text, "$1").into_owned()
}

/// Extracts the text of every page of a PDF document.
///
/// pdf-extract panics on some malformed documents (fonts without a
/// `/Subtype`, `Type0` fonts without descendants); those panics are
/// reported as [`ConvertError::Pdf`].
pub fn pdf_to_text(bytes: &[u8], keep_chinese: bool) -> Result<String, ConvertError> {
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|panic| ConvertError::Pdf(format!("extractor panicked: {}", panic_message(&*panic))))?
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;
    Ok(clean_extracted_text(text, keep_chinese))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Applies the page-marker cleanup unless `keep_chinese` is set.
pub fn clean_extracted_text(text: String, keep_chinese: bool) -> String {
    if keep_chinese {
        text
    } else {
        strip_page_markers(&text)
    }
}

/// Collects the visible text nodes of an HTML document, one per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .map(|el| matches!(el.value().name(), "script" | "style"))
            .unwrap_or(false);
        let chunk = text.trim();
        if hidden || chunk.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(chunk);
    }
    out
}

/// Converts a downloaded document to text based on its declared format.
pub fn document_to_text(
    format: &str,
    bytes: &[u8],
    keep_chinese: bool,
) -> Result<String, ConvertError> {
    match format.trim().to_ascii_lowercase().as_str() {
        "pdf" => pdf_to_text(bytes, keep_chinese),
        "htm" | "html" => Ok(html_to_text(&String::from_utf8_lossy(bytes))),
        other => Err(ConvertError::UnsupportedFormat(other.to_string())),
    }
}
