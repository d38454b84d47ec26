//! Document chunking strategies.
//!
//! Provides the `Chunker` trait and the word-window implementation used to
//! split normalized text into overlapping passages for embedding.

use super::config::ChunkingConfig;
use super::types::Chunk;

/// Trait for document chunking strategies.
pub trait Chunker: Send + Sync {
    /// Split normalized text into ordered chunks.
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<Chunk>;
}

/// Sliding word-window chunker.
///
/// Algorithm:
/// 1. Locate word boundaries (byte offsets of whitespace-separated words)
/// 2. Emit windows of `chunk_words` words, advancing `chunk_words - overlap_words`
/// 3. Stop once a window reaches the last word
/// 4. A trailing window shorter than `min_chunk_words` is folded into the
///    previous chunk instead of standing alone
///
/// Chunk text is the verbatim slice of the input between the first and last
/// word of the window, so line breaks inside a chunk survive.
#[derive(Debug, Default)]
pub struct WordWindowChunker;

impl WordWindowChunker {
    pub fn new() -> Self {
        Self
    }
}

/// Byte spans `[start, end)` of each whitespace-separated word.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}

impl Chunker for WordWindowChunker {
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
        let words = word_spans(text);
        if words.is_empty() {
            return Vec::new();
        }

        let size = config.chunk_words.max(1);
        let step = config.step();
        let total = words.len();

        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + size).min(total);
            let len = end - start;

            match windows.last_mut() {
                Some(prev) if len < config.min_chunk_words => prev.1 = end,
                _ => windows.push((start, end)),
            }

            if end >= total {
                break;
            }
            start += step;
        }

        let chunks: Vec<Chunk> = windows
            .into_iter()
            .enumerate()
            .map(|(index, (first, last))| {
                let byte_range = (words[first].0, words[last - 1].1);
                Chunk {
                    index,
                    word_range: (first, last),
                    byte_range,
                    text: text[byte_range.0..byte_range.1].to_string(),
                }
            })
            .collect();

        tracing::debug!(
            target: "chunk",
            "split {total} words into {} chunks (size {size}, step {step})",
            chunks.len()
        );
        chunks
    }
}
