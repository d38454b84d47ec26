//! Document acquisition, normalization and chunking.
//!
//! This module provides:
//! - HTTP fetching with size and format checks
//! - PDF and DOCX text extraction with whitespace normalization
//! - Word-window chunking with overlap and a trailing-chunk floor

pub mod chunker;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod types;

pub use chunker::{Chunker, WordWindowChunker};
pub use config::{ChunkingConfig, FetchConfig};
pub use fetcher::{DocumentSource, HttpFetcher};
pub use parser::{normalize_text, parse_document};
pub use types::{Chunk, Document, DocumentFormat, FetchedDocument, content_hash};

use crate::error::PipelineError;

/// Extract and normalize the text of fetched bytes off the async runtime.
pub async fn parse_fetched(fetched: FetchedDocument) -> Result<Document, PipelineError> {
    let FetchedDocument {
        url, bytes, format, ..
    } = fetched;
    let byte_len = bytes.len();

    // Extraction is CPU-bound and may be slow on large PDFs
    let text = tokio::task::spawn_blocking(move || parse_document(&bytes, format))
        .await
        .map_err(|e| crate::error::ParseError::Corrupt {
            format: format.to_string(),
            reason: format!("extraction task failed: {e}"),
        })??;

    Ok(Document::new(url, format, byte_len, text))
}

/// Fetch a URL and turn it into a normalized [`Document`].
pub async fn load_document(source: &dyn DocumentSource, url: &str) -> Result<Document, PipelineError> {
    let fetched = source.fetch(url).await?;
    parse_fetched(fetched).await
}
