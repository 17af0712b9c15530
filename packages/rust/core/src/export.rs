//! Rendering generated answers for hand-off.

use secq_shared::{GeneratedAnswer, Result, SecqError};

/// Output format for [`render_answers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

/// Render answers in persisted order.
pub fn render_answers(answers: &[GeneratedAnswer], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(answers)
            .map_err(|e| SecqError::parse(format!("failed to serialize answers: {e}"))),
        ExportFormat::Markdown => Ok(render_markdown(answers)),
    }
}

fn render_markdown(answers: &[GeneratedAnswer]) -> String {
    let mut out = String::from("# Security Questionnaire Answers\n");

    if answers.is_empty() {
        out.push_str("\n_No answers have been generated._\n");
        return out;
    }

    for (i, answer) in answers.iter().enumerate() {
        out.push_str(&format!("\n## {}. {}\n\n", i + 1, answer.question_text.trim()));
        if let Some(category) = &answer.category {
            out.push_str(&format!("**Category:** {category}\n\n"));
        }
        out.push_str(answer.answer_text.trim());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use secq_shared::now;

    fn answer(question: &str, text: &str, category: Option<&str>) -> GeneratedAnswer {
        GeneratedAnswer {
            id: format!("a-{question}"),
            question_id: format!("q-{question}"),
            question_text: question.into(),
            answer_text: text.into(),
            category: category.map(String::from),
            created_at: now(),
        }
    }

    #[test]
    fn markdown_has_one_section_per_answer() {
        let answers = [
            answer("Do you use MFA?", "Yes, for all staff.", Some("Access Management")),
            answer("Bug bounty?", "No information available in the knowledge base.", None),
        ];
        let md = render_answers(&answers, ExportFormat::Markdown).unwrap();

        assert!(md.starts_with("# Security Questionnaire Answers\n"));
        assert!(md.contains("## 1. Do you use MFA?\n\n**Category:** Access Management\n\nYes, for all staff.\n"));
        assert!(md.contains("## 2. Bug bounty?\n\nNo information"));
        assert_eq!(md.matches("**Category:**").count(), 1);
    }

    #[test]
    fn markdown_for_no_answers() {
        let md = render_answers(&[], ExportFormat::Markdown).unwrap();
        assert!(md.contains("No answers have been generated"));
    }

    #[test]
    fn json_is_an_array_in_order() {
        let answers = [answer("first", "1", None), answer("second", "2", Some("X"))];
        let json = render_answers(&answers, ExportFormat::Json).unwrap();
        let parsed: Vec<GeneratedAnswer> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, answers);
    }
}
