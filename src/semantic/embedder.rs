//! Local embedding generation with a pool of fastembed models.
//!
//! Holds several `TextEmbedding` instances handed out through a bounded
//! channel, so batches from one document can be embedded in parallel with
//! rayon while the vectors keep their input order.

use crossbeam_channel::{Receiver, Sender, bounded};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use rayon::prelude::*;
use std::path::PathBuf;

use super::EmbeddingGenerator;
use crate::config::SemanticSearchConfig;
use crate::error::EmbeddingError;

/// Texts per model call.
const BATCH_SIZE: usize = 64;

/// Resolve a configured model name to a fastembed model.
///
/// Accepts the enum variant name (`AllMiniLML6V2`) or the Hugging Face
/// repository id (`sentence-transformers/all-MiniLM-L6-v2`).
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
    let model = match name.trim() {
        "AllMiniLML6V2" | "sentence-transformers/all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
        "AllMiniLML12V2" | "sentence-transformers/all-MiniLM-L12-v2" => {
            EmbeddingModel::AllMiniLML12V2
        }
        "BGESmallENV15" | "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BGEBaseENV15" | "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "BGELargeENV15" | "BAAI/bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "NomicEmbedTextV15" | "nomic-ai/nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
        "MultilingualE5Small" | "intfloat/multilingual-e5-small" => {
            EmbeddingModel::MultilingualE5Small
        }
        other => {
            return Err(EmbeddingError::ModelInit(format!(
                "unknown embedding model '{other}'"
            )));
        }
    };
    Ok(model)
}

fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docquery")
        .join("models")
}

/// Pool of fastembed models behind [`EmbeddingGenerator`].
pub struct FastEmbedGenerator {
    model_sender: Sender<TextEmbedding>,
    model_receiver: Receiver<TextEmbedding>,
    pool_size: usize,
    dimension: usize,
    model_id: String,
}

impl FastEmbedGenerator {
    /// Create a pool with `pool_size` instances of `model`.
    ///
    /// Each instance holds its own copy of the ONNX session (~86MB for AllMiniLML6V2).
    pub fn new(
        model: EmbeddingModel,
        model_id: String,
        pool_size: usize,
        cache_dir: PathBuf,
    ) -> Result<Self, EmbeddingError> {
        let pool_size = pool_size.max(1);
        let (sender, receiver) = bounded(pool_size);

        tracing::info!(
            target: "semantic",
            "initializing embedding pool: {pool_size} instances ({model_id})"
        );

        let mut dimension = 0;
        for i in 0..pool_size {
            let mut text_model = TextEmbedding::try_new(
                InitOptions::new(model.clone())
                    .with_cache_dir(cache_dir.clone())
                    .with_show_download_progress(i == 0),
            )
            .map_err(|e| {
                EmbeddingError::ModelInit(format!("model instance {}: {e}", i + 1))
            })?;

            if i == 0 {
                let probe = text_model
                    .embed(vec!["dimension probe"], None)
                    .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
                dimension = probe.first().map(Vec::len).unwrap_or(0);
            }

            sender
                .send(text_model)
                .map_err(|_| EmbeddingError::ModelInit("model pool closed".to_string()))?;
        }

        if dimension == 0 {
            return Err(EmbeddingError::ModelInit(format!(
                "{model_id} produced an empty embedding"
            )));
        }

        tracing::info!(
            target: "semantic",
            "embedding pool ready: {pool_size} instances, {dimension} dimensions"
        );

        Ok(Self {
            model_sender: sender,
            model_receiver: receiver,
            pool_size,
            dimension,
            model_id,
        })
    }

    /// Build from the `[semantic_search]` settings section.
    pub fn from_settings(config: &SemanticSearchConfig) -> Result<Self, EmbeddingError> {
        let model = parse_embedding_model(&config.model)?;
        let cache_dir = config.cache_dir.clone().unwrap_or_else(default_models_dir);
        Self::new(model, config.model.clone(), config.pool_size, cache_dir)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Embed one batch on a pooled model, blocking until one is free.
    fn embed_on_pooled_model(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut model = self
            .model_receiver
            .recv()
            .map_err(|_| EmbeddingError::Generation("model pool closed".to_string()))?;
        let result = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()));
        let _ = self.model_sender.send(model);
        result
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<Vec<f32>>> = texts
            .par_chunks(BATCH_SIZE)
            .map(|batch| self.embed_on_pooled_model(batch))
            .collect::<Result<_, _>>()?;

        let embeddings: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Generation(format!(
                "model returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_model() {
        assert!(matches!(
            parse_embedding_model("AllMiniLML6V2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            parse_embedding_model("BAAI/bge-small-en-v1.5"),
            Ok(EmbeddingModel::BGESmallENV15)
        ));
        assert!(matches!(
            parse_embedding_model("word2vec"),
            Err(EmbeddingError::ModelInit(_))
        ));
    }

    #[test]
    #[ignore = "Downloads 86MB model - run with --ignored"]
    fn test_fastembed_is_deterministic() {
        let generator = FastEmbedGenerator::from_settings(&SemanticSearchConfig {
            pool_size: 2,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(generator.dimension(), 384);

        let texts = ["The grace period is thirty days.", "Claims are paid monthly."];
        let first = generator.embed_batch(&texts).unwrap();
        let second = generator.embed_batch(&texts).unwrap();
        assert_eq!(first, second);
    }
}
