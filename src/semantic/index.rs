//! In-memory vector index over the chunks of one document.

use serde::Serialize;

use super::{EmbeddingGenerator, cosine_similarity};
use crate::documents::Chunk;
use crate::error::{IndexError, PipelineError};

/// Chunks embedded per `embed_batch` call while building an index.
const BUILD_BATCH_SIZE: usize = 256;

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ordered (chunk, vector) pairs produced by a single embedding model.
///
/// Every vector has length `dimension`. Searches are exhaustive: documents
/// are small enough that a linear scan beats maintaining an ANN structure.
#[derive(Debug)]
pub struct VectorIndex {
    model_id: String,
    dimension: usize,
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            entries: Vec::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    pub fn add(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<(), IndexError> {
        self.check_dimension(vector.len())?;
        self.entries.push((chunk, vector));
        Ok(())
    }

    /// Return up to `k` chunks by descending cosine similarity.
    ///
    /// Equal scores are ordered by ascending chunk index, so results are
    /// reproducible for the same index and query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.check_dimension(query.len())?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, (_, vector))| (pos, cosine_similarity(query, vector)))
            .collect();

        scored.sort_by(|(a_pos, a_score), (b_pos, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| self.entries[*a_pos].0.index.cmp(&self.entries[*b_pos].0.index))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].0.clone(),
                score,
            })
            .collect())
    }
}

/// Embed every chunk and collect them into a new index.
///
/// Vectors must come back with the embedder's advertised dimension; a
/// mismatch means the model misreports itself and is surfaced as an index
/// error.
pub fn build_index(
    chunks: Vec<Chunk>,
    embedder: &dyn EmbeddingGenerator,
) -> Result<VectorIndex, PipelineError> {
    let mut index = VectorIndex::new(embedder.model_id(), embedder.dimension());
    let mut pending = chunks.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<Chunk> = pending.by_ref().take(BUILD_BATCH_SIZE).collect();
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts)?;

        if vectors.len() != batch.len() {
            return Err(PipelineError::Embedding(
                crate::error::EmbeddingError::Generation(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )),
            ));
        }

        for (chunk, vector) in batch.into_iter().zip(vectors) {
            index.add(chunk, vector)?;
        }
    }

    tracing::debug!(
        target: "semantic",
        "built index of {} chunks ({}, {} dims)",
        index.len(),
        index.model_id(),
        index.dimension()
    );
    Ok(index)
}
