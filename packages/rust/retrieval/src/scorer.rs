//! Token-overlap relevance scoring.

use std::collections::HashSet;

use secq_shared::KnowledgeBaseEntry;

use crate::tokenizer::tokenize;

/// The distinct tokens of a question.
///
/// Repeating a word in the question does not make it count more.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    terms: HashSet<String>,
}

impl QueryTerms {
    /// Tokenize a question into its term set.
    pub fn new(question: &str) -> Self {
        Self {
            terms: tokenize(question).into_iter().collect(),
        }
    }

    /// True when the question has no qualifying tokens.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Count corpus tokens that appear in the term set. Corpus duplicates all count.
    pub fn score_text(&self, corpus: &str) -> usize {
        if self.terms.is_empty() {
            return 0;
        }
        tokenize(corpus)
            .iter()
            .filter(|token| self.terms.contains(token.as_str()))
            .count()
    }
}

/// Score one knowledge base entry (question + answer) against a question.
pub fn score_entry(question: &str, entry: &KnowledgeBaseEntry) -> usize {
    QueryTerms::new(question).score_text(&entry.corpus())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, answer: &str) -> KnowledgeBaseEntry {
        KnowledgeBaseEntry::new("General", question, answer)
    }

    #[test]
    fn corpus_repetitions_count() {
        let e = entry(
            "Encryption policy",
            "We encrypt backups and encrypt customer data with AES.",
        );
        assert_eq!(score_entry("Do you encrypt data at rest?", &e), 3);
    }

    #[test]
    fn query_repetitions_do_not_inflate() {
        let e = entry("Logging", "Audit logs are retained.");
        let once = score_entry("audit retention", &e);
        let twice = score_entry("audit audit audit retention", &e);
        assert_eq!(once, twice);
        assert_eq!(once, 1);
    }

    #[test]
    fn identical_text_scores_qualifying_corpus_tokens() {
        let text = "Do you rotate keys yearly?";
        let e = entry(text, text);
        // "you", "rotate", "keys", "yearly" on both sides
        assert_eq!(score_entry(text, &e), 8);
    }

    #[test]
    fn no_overlap_scores_zero() {
        let e = entry("Physical security", "Badges are required.");
        assert_eq!(score_entry("Is MFA enforced?", &e), 0);
    }

    #[test]
    fn question_without_terms_scores_zero() {
        let terms = QueryTerms::new("is it ok?");
        assert!(terms.is_empty());
        assert_eq!(terms.score_text("is it ok"), 0);
    }
}
