//! Context selection: score, filter, rank, cap.

use secq_shared::KnowledgeBaseEntry;
use tracing::debug;

use crate::scorer::QueryTerms;

/// A knowledge base entry paired with its relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredEntry<'a> {
    pub entry: &'a KnowledgeBaseEntry,
    pub score: usize,
}

/// Pick the most relevant entries for `question`, at most `max_entries` of them.
///
/// Entries with no lexical overlap are discarded. Ranking is by score
/// descending; equal scores keep creation order (`created_at`, then `id`).
pub fn select_context<'a>(
    question: &str,
    entries: &'a [KnowledgeBaseEntry],
    max_entries: usize,
) -> Vec<ScoredEntry<'a>> {
    if max_entries == 0 {
        return Vec::new();
    }

    let terms = QueryTerms::new(question);
    let mut scored: Vec<ScoredEntry<'a>> = entries
        .iter()
        .map(|entry| ScoredEntry {
            entry,
            score: terms.score_text(&entry.corpus()),
        })
        .filter(|s| s.score > 0)
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.entry.created_at.cmp(&b.entry.created_at))
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    });
    scored.truncate(max_entries);

    debug!(
        candidates = entries.len(),
        selected = scored.len(),
        top_score = scored.first().map(|s| s.score).unwrap_or(0),
        "context selected"
    );

    scored
}
