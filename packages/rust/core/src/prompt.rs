//! Prompt construction with a strict grounding contract.
//!
//! The model only ever sees the question and the selected knowledge base
//! entries, and is told to answer with [`NO_INFORMATION_ANSWER`] when that
//! context is not enough. The same constant is the pipeline's own fallback for
//! empty model output.

use secq_retrieval::ScoredEntry;

/// The exact sentence used when the knowledge base cannot support an answer.
pub const NO_INFORMATION_ANSWER: &str = "No information available in the knowledge base.";

/// Rendered in place of the context block when no entry was selected.
pub const EMPTY_CONTEXT_MARKER: &str = "[NO RELEVANT KNOWLEDGE BASE ENTRIES FOUND]";

/// System and user messages for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

/// The grounding rule, repeated verbatim in both messages.
fn grounding_rule() -> String {
    format!(
        "Answer strictly from the provided knowledge base context. Do not invent facts, \
         controls, certifications, or policies. If the context is insufficient to answer, \
         respond with exactly: \"{NO_INFORMATION_ANSWER}\""
    )
}

/// Build the system + user prompt for `question` over the selected context.
pub fn compose_prompt(question: &str, context: &[ScoredEntry<'_>]) -> ComposedPrompt {
    let rule = grounding_rule();

    let system = format!(
        "You are an information security analyst completing security questionnaires on \
         behalf of your organization. Write concise, factual answers suitable for a \
         customer-facing questionnaire.\n\n{rule}"
    );

    let user = format!(
        "Question:\n{question}\n\nKnowledge base context:\n{context}\n\n{rule}",
        context = render_context(context),
    );

    ComposedPrompt { system, user }
}

/// Render the selected entries, best first.
fn render_context(context: &[ScoredEntry<'_>]) -> String {
    if context.is_empty() {
        return EMPTY_CONTEXT_MARKER.to_string();
    }

    context
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            let entry = scored.entry;
            format!(
                "[{n}] Entry ID: {id}\nCategory: {category}\nQuestion: {q}\nAnswer: {a}",
                n = i + 1,
                id = entry.id,
                category = entry.category,
                q = entry.question,
                a = entry.answer,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
