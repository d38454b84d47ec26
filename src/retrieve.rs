//! Question-to-passage retrieval over a document's vector index.
//!
//! Embeds the question with the same model that built the index, keeps the
//! chunks that clear the similarity threshold and summarizes how relevant the
//! document looks for the question.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{EmbeddingError, IndexError};
use crate::semantic::{EmbeddingGenerator, ScoredChunk, VectorIndex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrieveError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Coarse confidence that the document covers the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Classify from the best score and the number of chunks above threshold.
    pub fn classify(max_score: f32, relevant_count: usize) -> Self {
        if max_score >= 0.8 && relevant_count >= 3 {
            Self::High
        } else if max_score >= 0.6 && relevant_count >= 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score statistics over the top-k candidates, before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelevanceStats {
    pub max_score: f32,
    pub mean_score: f32,
    pub relevant_count: usize,
    pub confidence: Confidence,
}

impl RelevanceStats {
    fn from_candidates(candidates: &[ScoredChunk], threshold: f32) -> Self {
        if candidates.is_empty() {
            return Self {
                max_score: 0.0,
                mean_score: 0.0,
                relevant_count: 0,
                confidence: Confidence::Low,
            };
        }

        // Candidates arrive sorted, so the first is the best
        let max_score = candidates[0].score;
        let mean_score = candidates.iter().map(|c| c.score).sum::<f32>() / candidates.len() as f32;
        let relevant_count = candidates.iter().filter(|c| c.score >= threshold).count();

        Self {
            max_score,
            mean_score,
            relevant_count,
            confidence: Confidence::classify(max_score, relevant_count),
        }
    }
}

/// Chunks selected for one question.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Selected chunks by descending score.
    pub chunks: Vec<ScoredChunk>,

    /// Set when nothing cleared the threshold and the best raw match was
    /// used anyway.
    pub low_confidence: bool,

    pub relevance: RelevanceStats,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Embeds questions and searches an index built by the same model.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingGenerator>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingGenerator> {
        &self.embedder
    }

    /// Find up to `k` chunks scoring at least `threshold`.
    ///
    /// When no chunk clears the threshold but the index is not empty, the
    /// single best match is returned with `low_confidence` set.
    pub fn retrieve(
        &self,
        question: &str,
        index: &VectorIndex,
        k: usize,
        threshold: f32,
    ) -> Result<RetrievalResult, RetrieveError> {
        if index.model_id() != self.embedder.model_id() {
            return Err(IndexError::ModelMismatch {
                indexed: index.model_id().to_string(),
                current: self.embedder.model_id().to_string(),
            }
            .into());
        }

        let query = self.embedder.embed(question)?;
        let candidates = index.search(&query, k)?;
        let relevance = RelevanceStats::from_candidates(&candidates, threshold);

        let mut chunks: Vec<ScoredChunk> = candidates
            .iter()
            .filter(|c| c.score >= threshold)
            .cloned()
            .collect();

        let low_confidence = chunks.is_empty() && !candidates.is_empty();
        if low_confidence {
            chunks.extend(candidates.into_iter().take(1));
        }

        tracing::debug!(
            target: "retrieve",
            "{} of {} candidates kept (max {:.3}, {} confidence{})",
            chunks.len(),
            index.len(),
            relevance.max_score,
            relevance.confidence,
            if low_confidence { ", best-effort" } else { "" }
        );

        if let Some(top) = chunks.first() {
            tracing::trace!(
                target: "retrieve",
                "top match section {}: {}",
                top.chunk.index + 1,
                top.chunk.preview(80)
            );
        }

        Ok(RetrievalResult {
            chunks,
            low_confidence,
            relevance,
        })
    }
}
