//! Embeddings and vector search over document chunks.
//!
//! The embedding capability sits behind [`EmbeddingGenerator`] so the index
//! and retriever never depend on a concrete model. [`FastEmbedGenerator`] is
//! the local ONNX implementation.

mod embedder;
mod index;

pub use embedder::{FastEmbedGenerator, parse_embedding_model};
pub use index::{ScoredChunk, VectorIndex, build_index};

// Re-export key types
pub use fastembed::{EmbeddingModel, TextEmbedding};

use crate::error::EmbeddingError;

/// Produces fixed-dimension vectors for text.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector for a given `model_id`.
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimension of every vector this generator produces.
    fn dimension(&self) -> usize;

    /// Identity of the underlying model.
    fn model_id(&self) -> &str;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("no embedding returned".to_string()))
    }
}

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
