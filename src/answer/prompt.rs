//! Prompt assembly under a context word budget.

use crate::semantic::ScoredChunk;

/// Note appended when retrieval found little relevant content.
pub const LOW_CONFIDENCE_NOTE: &str = "NOTE: The semantic search indicates limited relevant content for this question. Please be extra careful to only state what is explicitly mentioned in the document.";

/// A chat prompt plus the chunks it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Positions (into the input slice) of the chunks placed in the context.
    pub included: Vec<usize>,
    /// Words of chunk text in the context.
    pub context_words: usize,
}

/// Build the prompt for one question.
///
/// Chunks are taken in the given order while their running word total stays
/// within `budget_words`. The first chunk that would overflow the budget ends
/// the context; nothing after it is considered.
pub fn build_prompt(
    instruction: &str,
    chunks: &[ScoredChunk],
    question: &str,
    budget_words: usize,
    low_confidence: bool,
) -> Prompt {
    let mut included = Vec::new();
    let mut context_words = 0;
    let mut context = String::new();

    for (pos, scored) in chunks.iter().enumerate() {
        let words = scored.chunk.word_count();
        if context_words + words > budget_words {
            break;
        }
        context_words += words;
        included.push(pos);

        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str(&format!(
            "[{}] (section {}, relevance {:.2})\n{}",
            included.len(),
            scored.chunk.index + 1,
            scored.score,
            scored.chunk.text
        ));
    }

    if context.is_empty() {
        context.push_str("(no relevant passages found)");
    }

    let mut user = format!(
        "DOCUMENT CONTEXT:\n{context}\n\nQUESTION:\n{}\n\nPlease analyze the document context and provide a detailed, accurate answer to the question. Base your response strictly on the information provided in the document context above.",
        question.trim()
    );
    if low_confidence {
        user.push_str("\n\n");
        user.push_str(LOW_CONFIDENCE_NOTE);
    }

    Prompt {
        system: instruction.to_string(),
        user,
        included,
        context_words,
    }
}
