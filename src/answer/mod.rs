//! Answer synthesis from retrieved passages.
//!
//! The generator never fails a question: model errors, empty output and
//! documents without content all become fallback answers carrying
//! [`UNABLE_TO_DETERMINE`], so a request always yields one answer per question.

pub mod domain;
pub mod explain;
pub mod generator;
pub mod model;
pub mod prompt;

pub use domain::Domain;
pub use explain::{KeyClause, extract_key_clauses};
pub use generator::{AnswerGenerator, GenerationParams};
pub use model::{LanguageModel, OpenAiChatModel};
pub use prompt::{Prompt, build_prompt};

use serde::Serialize;

use crate::retrieve::{Confidence, RelevanceStats};

/// Text of every fallback answer.
pub const UNABLE_TO_DETERMINE: &str = "Unable to determine from the provided context.";

/// Prefix of answers built from a below-threshold best match.
pub const LOW_CONFIDENCE_MARKER: &str = "[low confidence]";

/// Why a question received a fallback answer instead of a model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The document produced no chunks to search.
    NoContent,
    /// The language model call failed.
    ModelFailed(String),
    /// The model answered with nothing.
    EmptyOutput,
    /// The question could not be embedded.
    RetrievalFailed(String),
    /// The answering task ended without a result.
    TaskFailed,
    /// The request deadline passed before this question finished.
    TimedOut,
    /// No retrieved chunk fit the prompt's context budget.
    ContextOverBudget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    Fallback { reason: FallbackReason },
}

/// A chunk that was placed in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TracedChunk {
    pub index: usize,
    pub score: f32,
}

/// How an answer was produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerTrace {
    /// Chunks included in the prompt, in prompt order.
    pub chunks: Vec<TracedChunk>,
    pub low_confidence: bool,
    pub confidence: Confidence,
    pub relevance: RelevanceStats,
    /// Sentences from the context that share words with the question.
    /// Only filled when an explanation was requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_clauses: Vec<KeyClause>,
    pub model_id: String,
    /// RFC 3339 time the answer was produced.
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub status: AnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<AnswerTrace>,
}

impl Answer {
    /// Deterministic fallback for `question`.
    pub fn fallback(question: impl Into<String>, reason: FallbackReason) -> Self {
        Self {
            question: question.into(),
            text: UNABLE_TO_DETERMINE.to_string(),
            status: AnswerStatus::Fallback { reason },
            trace: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.status, AnswerStatus::Fallback { .. })
    }

    pub fn is_low_confidence(&self) -> bool {
        self.text.starts_with(LOW_CONFIDENCE_MARKER)
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match &self.status {
            AnswerStatus::Fallback { reason } => Some(reason),
            AnswerStatus::Answered => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_answer() {
        let answer = Answer::fallback("What is covered?", FallbackReason::TimedOut);
        assert!(answer.is_fallback());
        assert!(!answer.is_low_confidence());
        assert_eq!(answer.text, UNABLE_TO_DETERMINE);
        assert_eq!(answer.fallback_reason(), Some(&FallbackReason::TimedOut));
    }

    #[test]
    fn test_status_serialization() {
        let answer = Answer::fallback("q", FallbackReason::NoContent);
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["status"]["kind"], "fallback");
        assert_eq!(json["status"]["reason"], "no_content");
        assert!(json.get("trace").is_none());
    }
}
