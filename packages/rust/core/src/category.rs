//! Category inference for generated answers.

use secq_retrieval::ScoredEntry;
use secq_shared::SecurityQuestion;

/// Pick a category for the answer to `question`.
///
/// The top-ranked context entry wins, then the question's own category,
/// otherwise none. Blank labels are skipped.
pub fn resolve_category(context: &[ScoredEntry<'_>], question: &SecurityQuestion) -> Option<String> {
    context
        .first()
        .map(|top| top.entry.category.as_str())
        .filter(|c| !c.trim().is_empty())
        .or_else(|| {
            question
                .category
                .as_deref()
                .filter(|c| !c.trim().is_empty())
        })
        .map(str::to_owned)
}
