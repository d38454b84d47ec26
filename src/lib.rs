//! Question answering over remote PDF and DOCX documents.
//!
//! A request names a document URL and a list of questions. The document is
//! fetched, normalized, chunked and embedded once (see [`cache`]), then each
//! question retrieves its most relevant passages and a language model answers
//! from them. Every question gets an answer; those that cannot be answered get
//! a fallback.
//!
//! ```no_run
//! # async fn demo(embedder: std::sync::Arc<dyn docquery::EmbeddingGenerator>,
//! #               model: std::sync::Arc<dyn docquery::LanguageModel>) -> Result<(), docquery::OrchestratorError> {
//! use docquery::{QueryEngine, Settings};
//!
//! let engine = QueryEngine::builder(Settings::default())
//!     .embedder(embedder)
//!     .language_model(model)
//!     .build()?;
//! let answers = engine
//!     .answer_questions("https://example.com/policy.pdf", &["What is the grace period?"])
//!     .await?;
//! println!("{}", answers[0].text);
//! # Ok(())
//! # }
//! ```

pub mod logging;

pub mod answer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod documents;
pub mod error;
pub mod query;
pub mod retrieve;
pub mod semantic;

pub use answer::{
    Answer, AnswerStatus, AnswerTrace, Domain, FallbackReason, LOW_CONFIDENCE_MARKER,
    LanguageModel, OpenAiChatModel, UNABLE_TO_DETERMINE,
};
pub use cache::{CacheOutcome, CachedDocument, DocumentCache};
pub use config::{Settings, TimeoutPolicy};
pub use documents::{Chunk, Document, DocumentFormat, DocumentSource, HttpFetcher};
pub use error::{
    EmbeddingError, FetchError, IndexError, ModelError, OrchestratorError, ParseError,
    PipelineError,
};
pub use query::{QueryEngine, QueryOptions, QueryStage};
pub use retrieve::{Confidence, RetrievalResult, Retriever};
pub use semantic::{EmbeddingGenerator, FastEmbedGenerator, VectorIndex};
