//! Supporting clauses for explainable answers.

use serde::Serialize;
use std::collections::HashSet;

/// Sentences shorter than this are never reported.
const MIN_CLAUSE_CHARS: usize = 20;

/// Question words a sentence must share to count as supporting.
const MIN_WORD_OVERLAP: usize = 2;

const MAX_CLAUSES: usize = 5;

/// A context sentence that shares vocabulary with the question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyClause {
    /// Position of the sentence within the context.
    pub clause_id: usize,
    pub text: String,
    /// Share of question words found in the sentence.
    pub relevance_score: f32,
    pub word_overlap: usize,
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Pick up to five sentences of `context` that overlap most with `question`.
pub fn extract_key_clauses(context: &str, question: &str) -> Vec<KeyClause> {
    let question_words = words(question);
    if question_words.is_empty() {
        return Vec::new();
    }

    let mut clauses: Vec<KeyClause> = context
        .split(['.', '\n'])
        .enumerate()
        .filter_map(|(clause_id, sentence)| {
            let sentence = sentence.trim();
            if sentence.chars().count() < MIN_CLAUSE_CHARS {
                return None;
            }
            let overlap = words(sentence).intersection(&question_words).count();
            (overlap >= MIN_WORD_OVERLAP).then(|| KeyClause {
                clause_id,
                text: sentence.to_string(),
                relevance_score: overlap as f32 / question_words.len() as f32,
                word_overlap: overlap,
            })
        })
        .collect();

    // Stable sort keeps document order among equal scores
    clauses.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    clauses.truncate(MAX_CLAUSES);
    clauses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_overlapping_sentences() {
        let context = "The grace period for premium payment is thirty days. \
                       Claims are settled within fifteen days. \
                       Short one. \
                       A grace period does not apply to the first premium payment.";
        let clauses = extract_key_clauses(context, "What is the grace period for premium payment?");

        assert_eq!(clauses.len(), 2);
        assert!(clauses[0].text.starts_with("The grace period"));
        assert_eq!(clauses[0].clause_id, 0);
        assert!(clauses[0].relevance_score >= clauses[1].relevance_score);
        assert!(clauses.iter().all(|c| c.word_overlap >= 2));
    }

    #[test]
    fn test_limits_to_five() {
        let context = "The policy covers surgery in hospital wards. ".repeat(8);
        let clauses = extract_key_clauses(&context, "Does the policy cover surgery?");
        assert_eq!(clauses.len(), 5);
    }

    #[test]
    fn test_no_overlap() {
        assert!(extract_key_clauses("Completely unrelated sentence about weather.", "grace period?").is_empty());
        assert!(extract_key_clauses("Anything at all here for testing.", "  ").is_empty());
    }
}
