//! Per-question answer generation with fallback.

use std::sync::Arc;

use super::domain::Domain;
use super::explain::extract_key_clauses;
use super::model::LanguageModel;
use super::prompt::build_prompt;
use super::{
    Answer, AnswerStatus, AnswerTrace, FallbackReason, LOW_CONFIDENCE_MARKER, TracedChunk,
    UNABLE_TO_DETERMINE,
};
use crate::config::GenerationConfig;
use crate::retrieve::{Confidence, RetrievalResult};

/// Sampling and context limits for answer generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub context_word_budget: usize,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            context_word_budget: config.context_word_budget,
        }
    }
}

/// Turns retrieval results into answers using a [`LanguageModel`].
#[derive(Clone)]
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    params: GenerationParams,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, params: GenerationParams) -> Self {
        Self { model, params }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Answer `question` from `retrieval`. Never fails.
    pub async fn generate(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        domain: Domain,
        explain: bool,
    ) -> Answer {
        if retrieval.is_empty() {
            return Answer::fallback(question, FallbackReason::NoContent);
        }

        let weak = retrieval.low_confidence || retrieval.relevance.confidence == Confidence::Low;
        let prompt = build_prompt(
            &domain.instruction(),
            &retrieval.chunks,
            question,
            self.params.context_word_budget,
            weak,
        );
        if prompt.included.is_empty() {
            tracing::warn!(
                target: "answer",
                "no chunk fits the {} word context budget",
                self.params.context_word_budget
            );
            return Answer::fallback(question, FallbackReason::ContextOverBudget);
        }

        let included: Vec<_> = prompt
            .included
            .iter()
            .map(|&pos| &retrieval.chunks[pos])
            .collect();

        let key_clauses = if explain {
            let context = included
                .iter()
                .map(|scored| scored.chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            extract_key_clauses(&context, question)
        } else {
            Vec::new()
        };

        let trace = AnswerTrace {
            chunks: included
                .iter()
                .map(|scored| TracedChunk {
                    index: scored.chunk.index,
                    score: scored.score,
                })
                .collect(),
            low_confidence: retrieval.low_confidence,
            confidence: retrieval.relevance.confidence,
            relevance: retrieval.relevance,
            key_clauses,
            model_id: self.model.model_id().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        };

        let (text, status) = match self
            .model
            .generate(&prompt, self.params.max_tokens, self.params.temperature)
            .await
        {
            Ok(output) if output.trim().is_empty() => {
                tracing::warn!(target: "answer", "model returned empty output");
                (
                    UNABLE_TO_DETERMINE.to_string(),
                    AnswerStatus::Fallback {
                        reason: FallbackReason::EmptyOutput,
                    },
                )
            }
            Ok(output) => {
                let output = output.trim();
                let text = if retrieval.low_confidence {
                    format!("{LOW_CONFIDENCE_MARKER} {output}")
                } else {
                    output.to_string()
                };
                (text, AnswerStatus::Answered)
            }
            Err(e) => {
                tracing::warn!(target: "answer", "language model failed: {e}");
                (
                    UNABLE_TO_DETERMINE.to_string(),
                    AnswerStatus::Fallback {
                        reason: FallbackReason::ModelFailed(e.to_string()),
                    },
                )
            }
        };

        Answer {
            question: question.to_string(),
            text,
            status,
            trace: Some(trace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::prompt::Prompt;
    use crate::documents::Chunk;
    use crate::error::ModelError;
    use crate::retrieve::RelevanceStats;
    use crate::semantic::ScoredChunk;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedModel {
        reply: Result<String, ModelError>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl ScriptedModel {
        fn new(reply: Result<String, ModelError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(
            &self,
            prompt: &Prompt,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<String, ModelError> {
            self.prompts.lock().push(prompt.clone());
            self.reply.clone()
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn params() -> GenerationParams {
        GenerationParams {
            max_tokens: 100,
            temperature: 0.0,
            context_word_budget: 500,
        }
    }

    fn retrieval(low_confidence: bool) -> RetrievalResult {
        let text = "The grace period is thirty days.".to_string();
        RetrievalResult {
            chunks: vec![ScoredChunk {
                chunk: Chunk {
                    index: 2,
                    word_range: (0, 6),
                    byte_range: (0, text.len()),
                    text,
                },
                score: if low_confidence { 0.1 } else { 0.9 },
            }],
            low_confidence,
            relevance: RelevanceStats {
                max_score: 0.9,
                mean_score: 0.9,
                relevant_count: if low_confidence { 0 } else { 3 },
                confidence: if low_confidence {
                    Confidence::Low
                } else {
                    Confidence::High
                },
            },
        }
    }

    #[tokio::test]
    async fn test_answered() {
        let model = ScriptedModel::new(Ok("  The grace period is thirty days. ".to_string()));
        let generator = AnswerGenerator::new(model.clone(), params());

        let answer = generator
            .generate("What is the grace period?", &retrieval(false), Domain::Insurance, true)
            .await;

        assert_eq!(answer.status, AnswerStatus::Answered);
        assert_eq!(answer.text, "The grace period is thirty days.");
        let trace = answer.trace.unwrap();
        assert_eq!(trace.chunks, vec![TracedChunk { index: 2, score: 0.9 }]);
        assert_eq!(trace.model_id, "scripted");
        assert_eq!(trace.key_clauses.len(), 1);

        let prompts = model.prompts.lock();
        assert!(prompts[0].system.contains("insurance"));
        assert!(prompts[0].user.contains("thirty days"));
    }

    #[tokio::test]
    async fn test_low_confidence_marker() {
        let model = ScriptedModel::new(Ok("Possibly thirty days.".to_string()));
        let generator = AnswerGenerator::new(model, params());

        let answer = generator
            .generate("grace?", &retrieval(true), Domain::Generic, false)
            .await;
        assert!(answer.is_low_confidence());
        assert_eq!(answer.text, "[low confidence] Possibly thirty days.");
        assert!(answer.trace.unwrap().key_clauses.is_empty());
    }

    #[tokio::test]
    async fn test_model_error_becomes_fallback() {
        let generator = AnswerGenerator::new(ScriptedModel::new(Err(ModelError::RateLimited)), params());
        let answer = generator
            .generate("q", &retrieval(false), Domain::Generic, false)
            .await;
        assert_eq!(answer.text, UNABLE_TO_DETERMINE);
        assert!(matches!(
            answer.fallback_reason(),
            Some(FallbackReason::ModelFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_output_becomes_fallback() {
        let generator = AnswerGenerator::new(ScriptedModel::new(Ok(" \n".to_string())), params());
        let answer = generator
            .generate("q", &retrieval(false), Domain::Generic, false)
            .await;
        assert_eq!(answer.fallback_reason(), Some(&FallbackReason::EmptyOutput));
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_model() {
        let model = ScriptedModel::new(Ok("unused".to_string()));
        let generator = AnswerGenerator::new(model.clone(), params());
        let empty = RetrievalResult {
            chunks: Vec::new(),
            low_confidence: false,
            relevance: retrieval(false).relevance,
        };

        let answer = generator.generate("q", &empty, Domain::Generic, false).await;
        assert_eq!(answer.fallback_reason(), Some(&FallbackReason::NoContent));
        assert!(model.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_over_budget_skips_model() {
        let model = ScriptedModel::new(Ok("unused".to_string()));
        let generator = AnswerGenerator::new(
            model.clone(),
            GenerationParams {
                context_word_budget: 3,
                ..params()
            },
        );

        let answer = generator
            .generate("What is the grace period?", &retrieval(false), Domain::Generic, true)
            .await;
        assert_eq!(answer.text, UNABLE_TO_DETERMINE);
        assert_eq!(answer.fallback_reason(), Some(&FallbackReason::ContextOverBudget));
        assert!(model.prompts.lock().is_empty());
    }
}
