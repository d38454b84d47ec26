//! Text extraction for PDF and DOCX documents.
//!
//! Dispatches on [`DocumentFormat`] and returns normalized text: one line per
//! non-blank source line, runs of horizontal whitespace squeezed to a single
//! space, control characters dropped. Layout (columns, tables) is linearized
//! best-effort; reading order within a page or paragraph is preserved.

use std::io::{Cursor, Read};

use super::types::DocumentFormat;
use crate::error::ParseError;

/// Extract normalized text from raw document bytes.
pub fn parse_document(bytes: &[u8], format: DocumentFormat) -> Result<String, ParseError> {
    let raw = match format {
        DocumentFormat::Pdf => extract_pdf_text(bytes)?,
        DocumentFormat::Docx => extract_docx_text(bytes)?,
    };

    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(ParseError::EmptyContent);
    }

    tracing::debug!(
        target: "parse",
        "extracted {} chars ({} normalized) from {format}",
        raw.len(),
        text.len()
    );
    Ok(text)
}

/// Collapse page/paragraph boundaries to single newlines and squeeze whitespace.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());

    for line in raw.lines() {
        let mut squeezed = String::with_capacity(line.len());
        let mut pending_space = false;
        for c in line.chars() {
            if c.is_whitespace() {
                pending_space = true;
            } else if c.is_control() {
                continue;
            } else {
                if pending_space && !squeezed.is_empty() {
                    squeezed.push(' ');
                }
                pending_space = false;
                squeezed.push(c);
            }
        }

        if squeezed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&squeezed);
    }

    out
}

fn corrupt(format: DocumentFormat, reason: impl Into<String>) -> ParseError {
    ParseError::Corrupt {
        format: format.to_string(),
        reason: reason.into(),
    }
}

/// Extract PDF text, falling back to lopdf's content streams when pdf-extract fails.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, ParseError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| corrupt(DocumentFormat::Pdf, format!("failed to load PDF: {e}")))?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(corrupt(DocumentFormat::Pdf, "document is encrypted"));
    }

    // pdf-extract can panic on malformed font tables
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));

    match extracted {
        Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
        Ok(Ok(_)) => {
            tracing::debug!(target: "parse", "pdf-extract returned no text, trying lopdf");
            extract_pdf_text_via_lopdf(&doc)
        }
        Ok(Err(e)) => {
            tracing::warn!(target: "parse", "pdf-extract failed, trying lopdf: {e}");
            extract_pdf_text_via_lopdf(&doc)
        }
        Err(_) => {
            tracing::warn!(target: "parse", "pdf-extract panicked, trying lopdf");
            extract_pdf_text_via_lopdf(&doc)
        }
    }
}

/// Decode a PDF string operand: UTF-8 first, then Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
}

/// Less accurate for complex fonts but more tolerant of malformed PDFs.
fn extract_pdf_text_via_lopdf(doc: &lopdf::Document) -> Result<String, ParseError> {
    use lopdf::Object;

    let mut text = String::new();

    for (_page_num, page_id) in doc.get_pages() {
        let Ok(content) = doc.get_page_content(page_id) else {
            continue;
        };
        let operations = lopdf::content::Content::decode(&content)
            .map(|c| c.operations)
            .unwrap_or_default();

        for op in operations {
            match op.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(bytes, _)) = op.operands.last() {
                        text.push_str(&decode_pdf_string(bytes));
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                text.push_str(&decode_pdf_string(bytes));
                            }
                        }
                    }
                }
                "Td" | "TD" | "T*" => {
                    if !text.ends_with('\n') && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
                "ET" => {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }
        text.push('\n');
    }

    if text.trim().is_empty() {
        return Err(corrupt(DocumentFormat::Pdf, "no extractable text layer"));
    }
    Ok(text)
}

/// Extract paragraph text from `word/document.xml` inside a DOCX archive.
fn extract_docx_text(bytes: &[u8]) -> Result<String, ParseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| corrupt(DocumentFormat::Docx, format!("invalid archive: {e}")))?;

    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|_| corrupt(DocumentFormat::Docx, "missing word/document.xml"))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| corrupt(DocumentFormat::Docx, format!("unreadable document.xml: {e}")))?;

    Ok(docx_xml_to_text(&xml))
}

/// Tag name without attributes, e.g. `w:t` for `<w:t xml:space="preserve">`.
fn tag_name(tag: &str) -> &str {
    tag.split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
}

/// Walk WordprocessingML and keep text runs, one line per paragraph.
pub fn docx_xml_to_text(xml: &str) -> String {
    let mut result = String::new();
    let mut in_text = false;
    let mut chars = xml.chars();

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for tc in chars.by_ref() {
                if tc == '>' {
                    break;
                }
                tag.push(tc);
            }

            let self_closing = tag.ends_with('/');
            match tag_name(&tag) {
                "w:t" if !self_closing => in_text = true,
                "" if tag.starts_with("/w:t") && tag_name(&tag[1..]) == "w:t" => in_text = false,
                "w:tab" => result.push(' '),
                "w:br" | "w:cr" => result.push('\n'),
                "w:p" if !self_closing => {
                    if !result.is_empty() && !result.ends_with('\n') {
                        result.push('\n');
                    }
                }
                _ => {}
            }
        } else if in_text {
            result.push(c);
        }
    }

    decode_xml_entities(&result)
}

/// Decode the predefined XML entities and numeric character references.
fn decode_xml_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos..];
        let Some(end) = after.find(';') else {
            out.push_str(after);
            return out;
        };

        let entity = &after[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
