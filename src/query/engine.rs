//! The query engine.
//!
//! One request runs through these stages:
//!
//! ```text
//! Fetching -> Parsing -> Chunking -> Indexing(cached|built) -> Answering[i] -> Done
//! ```
//!
//! Everything up to indexing goes through the shared [`DocumentCache`], so a
//! document is processed once no matter how many requests ask about it.
//! Questions are then answered concurrently, bounded by a semaphore, and
//! reassembled in input order.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::answer::{Answer, AnswerGenerator, Domain, FallbackReason, GenerationParams, LanguageModel};
use crate::cache::{CacheStats, CachedDocument, DocumentCache};
use crate::config::{QueryConfig, RetrievalConfig, Settings, TimeoutPolicy};
use crate::documents::{
    ChunkingConfig, Chunker, DocumentSource, HttpFetcher, WordWindowChunker, parse_fetched,
};
use crate::error::{EmbeddingError, IndexError, OrchestratorError, PipelineError};
use crate::retrieve::{RetrieveError, Retriever};
use crate::semantic::{EmbeddingGenerator, build_index};
use crate::{debug_event, log_event};

/// Progress of a request, used in stage logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Fetching,
    Parsing,
    Chunking,
    Indexing { cached: bool },
    Answering { question: usize },
    Done,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching => f.write_str("Fetching"),
            Self::Parsing => f.write_str("Parsing"),
            Self::Chunking => f.write_str("Chunking"),
            Self::Indexing { cached: true } => f.write_str("Indexing(cached)"),
            Self::Indexing { cached: false } => f.write_str("Indexing(built)"),
            Self::Answering { question } => write!(f, "Answering[{question}]"),
            Self::Done => f.write_str("Done"),
        }
    }
}

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Instruction domain; the configured domain when `None`.
    pub domain: Option<Domain>,
    /// Attach key clauses to each answer's trace.
    pub explain: bool,
    /// Whole-request deadline; `query.request_timeout_secs` when `None`.
    pub timeout: Option<Duration>,
    /// Caller-side cancellation.
    pub cancel: Option<CancellationToken>,
}

/// Processing statistics for the engine.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub language_model: String,
    pub chunk_words: usize,
    pub overlap_words: usize,
    pub top_k: usize,
    pub threshold: f32,
    pub max_parallel_questions: usize,
    pub cache: CacheStats,
}

/// Failure while answering against a prepared document.
enum AnswerPhaseError {
    /// The index no longer matches the embedder.
    Index(IndexError),
    Request(OrchestratorError),
}

/// The capabilities a document build needs, owned so the build can run as
/// a detached cache task.
#[derive(Clone)]
struct DocumentBuilder {
    source: Arc<dyn DocumentSource>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingGenerator>,
    cache: Arc<DocumentCache>,
    chunking: ChunkingConfig,
}

impl DocumentBuilder {
    async fn build(self, url: String) -> Result<CachedDocument, PipelineError> {
        debug_event!("query", QueryStage::Fetching, "{url}");
        let fetched = self.source.fetch(&url).await?;

        debug_event!("query", QueryStage::Parsing, "{} bytes of {}", fetched.bytes.len(), fetched.format);
        let document = parse_fetched(fetched).await?;

        if let Some(index) = self
            .cache
            .shared_index(&document.content_hash)
            .filter(|index| index.model_id() == self.embedder.model_id())
        {
            log_event!("cache", "reused index", "{url} matches content {}", &document.content_hash[..12]);
            return Ok(CachedDocument::new(document, index));
        }

        debug_event!("query", QueryStage::Chunking, "{} words", document.word_count());
        self.chunking.validate().map_err(PipelineError::Chunking)?;
        let chunks = self.chunker.chunk(&document.text, &self.chunking);

        let embedder = self.embedder.clone();
        let index = tokio::task::spawn_blocking(move || build_index(chunks, embedder.as_ref()))
            .await
            .map_err(|e| {
                PipelineError::Embedding(EmbeddingError::Generation(format!(
                    "indexing task failed: {e}"
                )))
            })??;
        let index = Arc::new(index);
        self.cache.register_index(&document.content_hash, &index);

        log_event!("cache", "built", "{url} ({} chunks)", index.len());
        Ok(CachedDocument::new(document, index))
    }
}

/// Answers batches of questions about remote documents.
pub struct QueryEngine {
    documents: DocumentBuilder,
    retriever: Retriever,
    generator: AnswerGenerator,
    cache: Arc<DocumentCache>,
    retrieval: RetrievalConfig,
    query: QueryConfig,
    domain: Domain,
    shutdown: CancellationToken,
}

/// Assembles a [`QueryEngine`] from settings and capabilities.
pub struct QueryEngineBuilder {
    settings: Settings,
    source: Option<Arc<dyn DocumentSource>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    model: Option<Arc<dyn LanguageModel>>,
    cache: Option<Arc<DocumentCache>>,
}

impl QueryEngineBuilder {
    pub fn source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Share a cache between engines.
    pub fn cache(mut self, cache: Arc<DocumentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<QueryEngine, OrchestratorError> {
        let settings = self.settings;
        settings
            .validate()
            .map_err(|issues| OrchestratorError::InvalidConfig(issues.join("; ")))?;

        let embedder = self.embedder.ok_or_else(|| {
            OrchestratorError::InvalidConfig("no embedding model configured".to_string())
        })?;
        let model = self.model.ok_or_else(|| {
            OrchestratorError::InvalidConfig("no language model configured".to_string())
        })?;

        let source = match self.source {
            Some(source) => source,
            None => Arc::new(
                HttpFetcher::new(settings.fetch.clone()).map_err(|e| {
                    OrchestratorError::InvalidConfig(format!("cannot build HTTP client: {e}"))
                })?,
            ),
        };

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(DocumentCache::from_config(&settings.cache)));
        let documents = DocumentBuilder {
            source,
            chunker: self
                .chunker
                .unwrap_or_else(|| Arc::new(WordWindowChunker::new())),
            embedder: embedder.clone(),
            cache: cache.clone(),
            chunking: settings.chunking.clone(),
        };

        Ok(QueryEngine {
            documents,
            retriever: Retriever::new(embedder),
            generator: AnswerGenerator::new(model, GenerationParams::from(&settings.generation)),
            cache,
            retrieval: settings.retrieval.clone(),
            query: settings.query.clone(),
            domain: settings.generation.domain,
            shutdown: CancellationToken::new(),
        })
    }
}

impl QueryEngine {
    pub fn builder(settings: Settings) -> QueryEngineBuilder {
        QueryEngineBuilder {
            settings,
            source: None,
            chunker: None,
            embedder: None,
            model: None,
            cache: None,
        }
    }

    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Answer `questions` about the document at `url` with default options.
    pub async fn answer_questions<Q: AsRef<str>>(
        &self,
        url: &str,
        questions: &[Q],
    ) -> Result<Vec<Answer>, OrchestratorError> {
        self.answer_questions_with(url, questions, &QueryOptions::default())
            .await
    }

    /// Answer `questions` about the document at `url`.
    ///
    /// On success the result holds exactly one answer per question, in input
    /// order. Questions that could not be answered carry fallback answers.
    pub async fn answer_questions_with<Q: AsRef<str>>(
        &self,
        url: &str,
        questions: &[Q],
        options: &QueryOptions,
    ) -> Result<Vec<Answer>, OrchestratorError> {
        let questions: Vec<String> = questions.iter().map(|q| q.as_ref().to_string()).collect();
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_secs(self.query.request_timeout_secs));
        let deadline = tokio::time::Instant::now() + timeout;
        let token = self.request_token(options.cancel.as_ref());
        let _guard = token.clone().drop_guard();

        let domain = options.domain.unwrap_or(self.domain);
        log_event!("query", "request", "{} questions about {url} ({domain})", questions.len());

        let mut cached = self.prepare(url, &token, deadline, started).await?;
        let mut rebuilt = false;

        loop {
            match self
                .answer_all(&cached, &questions, domain, options.explain, &token, deadline, started)
                .await
            {
                Ok(answers) => {
                    debug_event!("query", QueryStage::Done, "{} ms", started.elapsed().as_millis());
                    return Ok(answers);
                }
                Err(AnswerPhaseError::Request(e)) => return Err(e),
                Err(AnswerPhaseError::Index(e)) if !rebuilt => {
                    tracing::warn!(target: "query", "stale index for {url}, rebuilding: {e}");
                    self.cache.invalidate(url);
                    rebuilt = true;
                    cached = self.prepare(url, &token, deadline, started).await?;
                }
                Err(AnswerPhaseError::Index(e)) => {
                    return Err(PipelineError::Index(e).into());
                }
            }
        }
    }

    /// Cancel every in-flight request.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> QueryStats {
        let embedder = self.retriever.embedder();
        QueryStats {
            embedding_model: embedder.model_id().to_string(),
            embedding_dimension: embedder.dimension(),
            language_model: self.generator.model_id().to_string(),
            chunk_words: self.documents.chunking.chunk_words,
            overlap_words: self.documents.chunking.overlap_words,
            top_k: self.retrieval.top_k,
            threshold: self.retrieval.threshold,
            max_parallel_questions: self.query.max_parallel_questions,
            cache: self.cache.stats(),
        }
    }

    /// Child of the engine token, also cancelled by `external`.
    fn request_token(&self, external: Option<&CancellationToken>) -> CancellationToken {
        let token = self.shutdown.child_token();
        if let Some(external) = external.cloned() {
            let linked = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => linked.cancel(),
                    _ = linked.cancelled() => {}
                }
            });
        }
        token
    }

    /// Fetch, parse, chunk and index `url` through the cache.
    async fn prepare(
        &self,
        url: &str,
        token: &CancellationToken,
        deadline: tokio::time::Instant,
        started: Instant,
    ) -> Result<Arc<CachedDocument>, OrchestratorError> {
        let builder = self.documents.clone();
        let owned_url = url.to_string();
        let build = self
            .cache
            .get_or_build(url, move || builder.build(owned_url));

        let (cached, outcome) = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(OrchestratorError::Timeout { elapsed_ms: elapsed_ms(started) });
            }
            result = build => result?,
        };

        debug_event!(
            "query",
            QueryStage::Indexing {
                cached: outcome == crate::cache::CacheOutcome::Hit
            },
            "{} chunks",
            cached.index.len()
        );
        Ok(cached)
    }

    /// Answer every question against a prepared document.
    #[allow(clippy::too_many_arguments)]
    async fn answer_all(
        &self,
        cached: &Arc<CachedDocument>,
        questions: &[String],
        domain: Domain,
        explain: bool,
        token: &CancellationToken,
        deadline: tokio::time::Instant,
        started: Instant,
    ) -> Result<Vec<Answer>, AnswerPhaseError> {
        if cached.index.is_empty() {
            tracing::warn!(target: "query", "{} has no answerable content", cached.document.url);
            return Ok(questions
                .iter()
                .map(|q| Answer::fallback(q.as_str(), FallbackReason::NoContent))
                .collect());
        }

        let semaphore = Arc::new(Semaphore::new(self.query.max_parallel_questions.max(1)));
        let mut tasks = JoinSet::new();

        for (i, question) in questions.iter().enumerate() {
            let semaphore = semaphore.clone();
            let retriever = self.retriever.clone();
            let generator = self.generator.clone();
            let index = cached.index.clone();
            let question = question.clone();
            let (k, threshold) = (self.retrieval.top_k, self.retrieval.threshold);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (i, Ok(Answer::fallback(question, FallbackReason::TaskFailed)));
                };
                debug_event!("query", QueryStage::Answering { question: i });

                let q = question.clone();
                let retrieval =
                    tokio::task::spawn_blocking(move || retriever.retrieve(&q, &index, k, threshold))
                        .await;

                match retrieval {
                    Ok(Ok(result)) => {
                        let answer = generator.generate(&question, &result, domain, explain).await;
                        (i, Ok(answer))
                    }
                    Ok(Err(RetrieveError::Index(e))) => (i, Err(e)),
                    Ok(Err(RetrieveError::Embedding(e))) => {
                        tracing::warn!(target: "query", "question {i} could not be embedded: {e}");
                        let reason = FallbackReason::RetrievalFailed(e.to_string());
                        (i, Ok(Answer::fallback(question, reason)))
                    }
                    Err(e) => {
                        tracing::warn!(target: "query", "retrieval task for question {i} failed: {e}");
                        (i, Ok(Answer::fallback(question, FallbackReason::TaskFailed)))
                    }
                }
            });
        }

        let mut slots: Vec<Option<Answer>> = vec![None; questions.len()];
        let mut completed = 0;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tasks.abort_all();
                    return Err(AnswerPhaseError::Request(OrchestratorError::Cancelled));
                }
                _ = &mut sleep => {
                    tasks.abort_all();
                    return Err(AnswerPhaseError::Request(
                        self.timed_out(slots, questions, completed, started),
                    ));
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((i, Ok(answer)))) => {
                        slots[i] = Some(answer);
                        completed += 1;
                    }
                    Some(Ok((_, Err(e)))) => {
                        tasks.abort_all();
                        return Err(AnswerPhaseError::Index(e));
                    }
                    Some(Err(e)) => {
                        tracing::warn!(target: "query", "answer task failed: {e}");
                    }
                },
            }
        }

        Ok(slots
            .into_iter()
            .zip(questions)
            .map(|(slot, q)| {
                slot.unwrap_or_else(|| Answer::fallback(q.as_str(), FallbackReason::TaskFailed))
            })
            .collect())
    }

    /// Apply the timeout policy once the deadline passes mid-answering.
    fn timed_out(
        &self,
        slots: Vec<Option<Answer>>,
        questions: &[String],
        completed: usize,
        started: Instant,
    ) -> OrchestratorError {
        let elapsed_ms = elapsed_ms(started);
        tracing::warn!(
            target: "query",
            "deadline passed with {completed} of {} questions answered",
            questions.len()
        );

        if self.query.timeout_policy == TimeoutPolicy::Fail || completed == 0 {
            return OrchestratorError::Timeout { elapsed_ms };
        }

        let answers = slots
            .into_iter()
            .zip(questions)
            .map(|(slot, q)| {
                slot.unwrap_or_else(|| Answer::fallback(q.as_str(), FallbackReason::TimedOut))
            })
            .collect();
        OrchestratorError::PartialTimeout { answers, completed }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}
