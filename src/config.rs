//! Configuration module for the document query pipeline.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DQ_` and use double underscores
//! to separate nested levels:
//! - `DQ_RETRIEVAL__TOP_K=5` sets `retrieval.top_k`
//! - `DQ_GENERATION__MODEL=gpt-4o-mini` sets `generation.model`
//! - `DQ_QUERY__TIMEOUT_POLICY=fail` sets `query.timeout_policy`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::answer::Domain;
use crate::documents::{ChunkingConfig, FetchConfig};

/// Directory holding the settings file, searched from the current directory upward.
pub const CONFIG_DIR: &str = ".docquery";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

const ENV_PREFIX: &str = "DQ_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Document download settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Chunking settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding model settings
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    /// Retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Answer generation settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Document/index cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-request orchestration settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SemanticSearchConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Number of model instances used for parallel chunk embedding
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Directory for downloaded model files (defaults to the user cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a chunk to count as relevant
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum output tokens per answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum words of retrieved context placed in a prompt
    #[serde(default = "default_context_word_budget")]
    pub context_word_budget: usize,

    /// Domain used to pick the system instruction
    #[serde(default)]
    pub domain: Domain,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached documents
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Seconds before a cached document is refetched (0 disables expiry)
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryConfig {
    /// Questions answered concurrently within one request
    #[serde(default = "default_max_parallel_questions")]
    pub max_parallel_questions: usize,

    /// Whole-request deadline in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// What to return when the deadline passes mid-request
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
}

/// Behavior when a request deadline passes after indexing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Always fail the whole request.
    Fail,
    /// Return committed answers plus fallback markers for the rest.
    #[default]
    Partial,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides (target = level)
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_pool_size() -> usize {
    num_cpus::get().clamp(1, 4)
}
fn default_top_k() -> usize {
    8
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_api_base() -> String {
    "https://router.huggingface.co/v1".to_string()
}
fn default_api_key_env() -> String {
    "HF_TOKEN".to_string()
}
fn default_llm_model() -> String {
    "meta-llama/Llama-3.2-1B-Instruct:novita".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_context_word_budget() -> usize {
    3000
}
fn default_cache_capacity() -> usize {
    32
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_max_parallel_questions() -> usize {
    4
}
fn default_request_timeout_secs() -> u64 {
    180
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            fetch: FetchConfig::default(),
            chunking: ChunkingConfig::default(),
            semantic_search: SemanticSearchConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            pool_size: default_pool_size(),
            cache_dir: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_similarity_threshold(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout_secs(),
            context_word_budget: default_context_word_budget(),
            domain: Domain::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_parallel_questions: default_max_parallel_questions(),
            request_timeout_secs: default_request_timeout_secs(),
            timeout_policy: TimeoutPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path =
            Self::find_workspace_config().unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores stay
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a .docquery directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if let Err(e) = self.chunking.validate() {
            issues.push(e);
        }
        if !(0.0..=1.0).contains(&self.retrieval.threshold) {
            issues.push("retrieval.threshold must be between 0 and 1".to_string());
        }
        if self.retrieval.top_k == 0 {
            issues.push("retrieval.top_k must be positive".to_string());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            issues.push("generation.temperature must be between 0 and 2".to_string());
        }
        if self.generation.max_tokens == 0 {
            issues.push("generation.max_tokens must be positive".to_string());
        }
        if self.generation.context_word_budget == 0 {
            issues.push("generation.context_word_budget must be positive".to_string());
        } else if self.chunking.chunk_words + self.chunking.min_chunk_words
            > self.generation.context_word_budget
        {
            // A merged tail chunk can reach chunk_words + min_chunk_words
            issues.push(format!(
                "generation.context_word_budget ({}) must fit one chunk of up to {} words",
                self.generation.context_word_budget,
                self.chunking.chunk_words + self.chunking.min_chunk_words
            ));
        }
        if self.fetch.max_bytes == 0 {
            issues.push("fetch.max_bytes must be positive".to_string());
        }
        if self.cache.capacity == 0 {
            issues.push("cache.capacity must be positive".to_string());
        }
        if self.query.max_parallel_questions == 0 {
            issues.push("query.max_parallel_questions must be positive".to_string());
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = Path::new(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
