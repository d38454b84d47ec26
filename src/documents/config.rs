//! Configuration types for document acquisition and chunking.

use serde::{Deserialize, Serialize};

/// Configuration for fetching remote documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum accepted response body size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Content types accepted without falling back to URL/magic detection.
    #[serde(default = "default_accepted_content_types")]
    pub accepted_content_types: Vec<String>,

    /// User agent sent with fetch requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_accepted_content_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
    ]
}

fn default_user_agent() -> String {
    format!("docquery/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            timeout_secs: default_fetch_timeout_secs(),
            accepted_content_types: default_accepted_content_types(),
            user_agent: default_user_agent(),
        }
    }
}

/// Configuration for word-window chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in words.
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,

    /// Words shared between adjacent chunks.
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,

    /// A trailing chunk smaller than this is merged into its predecessor.
    #[serde(default = "default_min_chunk_words")]
    pub min_chunk_words: usize,
}

fn default_chunk_words() -> usize {
    1000
}

fn default_overlap_words() -> usize {
    200
}

fn default_min_chunk_words() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
            min_chunk_words: default_min_chunk_words(),
        }
    }
}

impl ChunkingConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_words == 0 {
            return Err("chunk_words must be greater than 0".to_string());
        }

        if self.overlap_words >= self.chunk_words {
            return Err(format!(
                "overlap_words ({}) must be less than chunk_words ({})",
                self.overlap_words, self.chunk_words
            ));
        }

        if self.min_chunk_words > self.chunk_words {
            return Err(format!(
                "min_chunk_words ({}) must not exceed chunk_words ({})",
                self.min_chunk_words, self.chunk_words
            ));
        }

        Ok(())
    }

    /// Number of words the window advances per step.
    pub fn step(&self) -> usize {
        self.chunk_words.saturating_sub(self.overlap_words).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_config_defaults() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_words, 1000);
        assert_eq!(config.overlap_words, 200);
        assert_eq!(config.min_chunk_words, 50);
        assert_eq!(config.step(), 800);
    }

    #[test]
    fn test_chunking_config_validation() {
        let mut config = ChunkingConfig::default();
        assert!(config.validate().is_ok());

        config.overlap_words = 1000;
        assert!(config.validate().is_err());

        config.overlap_words = 10;
        config.min_chunk_words = 2000;
        assert!(config.validate().is_err());

        config.min_chunk_words = 10;
        config.chunk_words = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fetch_config_accepts_pdf_and_docx() {
        let config = FetchConfig::default();
        assert!(config.accepted_content_types.iter().any(|t| t == "application/pdf"));
        assert!(config
            .accepted_content_types
            .iter()
            .any(|t| t.ends_with("wordprocessingml.document")));
        assert_eq!(config.max_bytes, 50 * 1024 * 1024);
    }
}
