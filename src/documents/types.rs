//! Core types for fetched documents and their chunks.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Match a `Content-Type` header value (parameters ignored).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            _ => None,
        }
    }

    /// Match a file extension without the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Identify the format from leading magic bytes.
    ///
    /// DOCX is a ZIP container, so any ZIP is assumed to be DOCX here and
    /// verified later by the parser.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(Self::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(Self::Docx)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw bytes retrieved from a URL.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub format: DocumentFormat,
}

/// A fetched and normalized document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source URL.
    pub url: String,

    /// SHA-256 of the normalized text (hex).
    pub content_hash: String,

    /// Detected format.
    pub format: DocumentFormat,

    /// Size of the downloaded body in bytes.
    pub byte_len: usize,

    /// Normalized UTF-8 text.
    pub text: String,
}

impl Document {
    pub fn new(url: String, format: DocumentFormat, byte_len: usize, text: String) -> Self {
        Self {
            content_hash: content_hash(&text),
            url,
            format,
            byte_len,
            text,
        }
    }

    /// Number of whitespace-separated words in the normalized text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Calculate the SHA-256 hash of text content.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A contiguous span of a document's normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position within the document.
    pub index: usize,

    /// Word range `[start, end)` in the document's word sequence.
    pub word_range: (usize, usize),

    /// Byte range `[start, end)` in the normalized text.
    pub byte_range: (usize, usize),

    /// Verbatim text of the span.
    pub text: String,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.word_range.1 - self.word_range.0
    }

    /// Get a preview of the content (first N characters).
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((end, _)) => &self.text[..end],
            None => &self.text,
        }
    }
}
