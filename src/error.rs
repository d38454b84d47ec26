//! Error taxonomy for the query pipeline.
//!
//! Each pipeline stage has its own error enum. Stage failures that make the
//! whole request unanswerable are wrapped in [`PipelineError`] and surface as
//! [`OrchestratorError::Fatal`]. Per-question failures (model errors, weak
//! retrieval) never reach this level; they are folded into fallback answers.

use thiserror::Error;

use crate::answer::Answer;

/// Errors from retrieving a document over the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid document URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Document unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Document exceeds size limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Unsupported document format: {detail}")]
    UnsupportedFormat { detail: String },
}

/// Errors from turning raw bytes into normalized text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Corrupt {format} document: {reason}")]
    Corrupt { format: String, reason: String },

    #[error("Document contains no extractable text")]
    EmptyContent,
}

/// Invariant violations inside a vector index.
///
/// These indicate a stale cache entry (an index built with a different
/// embedding model), not bad user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Vector dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding model mismatch: index built with '{indexed}', query uses '{current}'")]
    ModelMismatch { indexed: String, current: String },
}

/// Errors from the embedding capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embedding: {0}")]
    Generation(String),
}

/// Errors from the language model capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Language model rate limited the request")]
    RateLimited,

    #[error("Language model call timed out")]
    Timeout,

    #[error("Invalid language model response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),
}

/// A stage failure that prevents answering any question.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid chunking configuration: {0}")]
    Chunking(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Document build stopped before finishing: {0}")]
    BuildAborted(String),
}

/// Top-level error returned by [`crate::query::QueryEngine::answer_questions`].
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("Request failed: {0}")]
    Fatal(#[from] PipelineError),

    #[error("Request timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The deadline passed after some answers were committed. `answers` holds
    /// one entry per input question, unfinished ones as fallback answers.
    #[error("Request timed out with {completed} of {} questions answered", answers.len())]
    PartialTimeout { answers: Vec<Answer>, completed: usize },

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchestratorError {
    /// Stable, user-safe classification of the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Fatal(PipelineError::Fetch(e)) => match e {
                FetchError::InvalidUrl { .. } => "fetch_invalid_url",
                FetchError::Unreachable { .. } => "fetch_unreachable",
                FetchError::Timeout { .. } => "fetch_timeout",
                FetchError::TooLarge { .. } => "fetch_too_large",
                FetchError::UnsupportedFormat { .. } => "fetch_unsupported_format",
            },
            Self::Fatal(PipelineError::Parse(ParseError::Corrupt { .. })) => "parse_corrupt",
            Self::Fatal(PipelineError::Parse(ParseError::EmptyContent)) => "parse_empty_content",
            Self::Fatal(PipelineError::Chunking(_)) => "chunking_invalid",
            Self::Fatal(PipelineError::Embedding(_)) => "embedding_failed",
            Self::Fatal(PipelineError::Index(_)) => "index_corrupt",
            Self::Fatal(PipelineError::BuildAborted(_)) => "build_aborted",
            Self::Timeout { .. } => "timeout",
            Self::PartialTimeout { .. } => "partial_timeout",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        let err = OrchestratorError::Fatal(PipelineError::Fetch(FetchError::Unreachable {
            url: "http://x".to_string(),
            reason: "refused".to_string(),
        }));
        assert_eq!(err.reason(), "fetch_unreachable");

        let err = OrchestratorError::Fatal(ParseError::EmptyContent.into());
        assert_eq!(err.reason(), "parse_empty_content");

        assert_eq!(OrchestratorError::Timeout { elapsed_ms: 5 }.reason(), "timeout");
    }

    #[test]
    fn test_pipeline_error_is_transparent() {
        let err: PipelineError = FetchError::TooLarge { limit: 10 }.into();
        assert_eq!(err.to_string(), "Document exceeds size limit of 10 bytes");
    }
}
