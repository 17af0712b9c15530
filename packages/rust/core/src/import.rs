//! Bulk import of knowledge base entries and questions from files.
//!
//! KB entries: a JSON array of `{id?, category, question, answer}`. Records with
//! an `id` are upserted; the rest get a fresh id.
//!
//! Questions: a JSON array of `{text, category?}`, or a plain-text file with one
//! question per non-blank line.

use std::path::Path;

use chrono::Duration;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use secq_shared::{KnowledgeBaseEntry, Result, SecqError, SecurityQuestion, new_record_id, now};
use secq_storage::Storage;

/// One KB entry as it appears in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct KbImportRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub category: String,
    pub question: String,
    pub answer: String,
}

/// One question as it appears in a JSON import file.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionImportRecord {
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Layout of a question import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionFileFormat {
    Json,
    Lines,
}

impl QuestionFileFormat {
    /// `.json` files are JSON; anything else is one question per line.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Lines,
        }
    }
}

/// Counts from a KB import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KbImportSummary {
    pub inserted: usize,
    pub updated: usize,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a KB import document.
pub fn parse_kb_entries(content: &str) -> Result<Vec<KbImportRecord>> {
    let records: Vec<KbImportRecord> = serde_json::from_str(content)
        .map_err(|e| SecqError::parse(format!("invalid KB import JSON: {e}")))?;

    for (i, record) in records.iter().enumerate() {
        for (field, value) in [
            ("category", &record.category),
            ("question", &record.question),
            ("answer", &record.answer),
        ] {
            if value.trim().is_empty() {
                return Err(SecqError::validation(format!(
                    "KB record {}: '{field}' must not be blank",
                    i + 1
                )));
            }
        }
        if record.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(SecqError::validation(format!(
                "KB record {}: 'id' must not be blank when present",
                i + 1
            )));
        }
    }
    Ok(records)
}

/// Parse and validate a question import document.
pub fn parse_questions(content: &str, format: QuestionFileFormat) -> Result<Vec<QuestionImportRecord>> {
    match format {
        QuestionFileFormat::Json => {
            let records: Vec<QuestionImportRecord> = serde_json::from_str(content)
                .map_err(|e| SecqError::parse(format!("invalid question import JSON: {e}")))?;
            records
                .into_iter()
                .enumerate()
                .map(|(i, record)| {
                    let text = record.text.trim();
                    if text.is_empty() {
                        return Err(SecqError::validation(format!(
                            "question record {}: 'text' must not be blank",
                            i + 1
                        )));
                    }
                    Ok(QuestionImportRecord {
                        text: text.to_string(),
                        category: record
                            .category
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty()),
                    })
                })
                .collect()
        }
        QuestionFileFormat::Lines => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| QuestionImportRecord {
                text: line.to_string(),
                category: None,
            })
            .collect()),
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Import KB entries from a JSON file.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn import_kb_file(storage: &Storage, path: &Path) -> Result<KbImportSummary> {
    let content = std::fs::read_to_string(path).map_err(|e| SecqError::io(path, e))?;
    let records = parse_kb_entries(&content)?;
    import_kb_records(storage, records).await
}

/// Store parsed KB records. File order becomes creation order for new entries.
pub async fn import_kb_records(
    storage: &Storage,
    records: Vec<KbImportRecord>,
) -> Result<KbImportSummary> {
    let base = now();
    let mut summary = KbImportSummary::default();

    for (i, record) in records.into_iter().enumerate() {
        let ts = base + Duration::microseconds(i as i64);
        let entry = KnowledgeBaseEntry {
            id: record.id.clone().unwrap_or_else(new_record_id),
            category: record.category.trim().to_string(),
            question: record.question.trim().to_string(),
            answer: record.answer.trim().to_string(),
            created_at: ts,
            updated_at: ts,
        };

        match record.id {
            Some(_) => {
                let existed = storage.get_kb_entry(&entry.id).await?.is_some();
                storage.upsert_kb_entry(&entry).await?;
                if existed {
                    summary.updated += 1;
                } else {
                    summary.inserted += 1;
                }
            }
            None => {
                storage.insert_kb_entry(&entry).await?;
                summary.inserted += 1;
            }
        }
        debug!(id = %entry.id, "imported kb entry");
    }

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        "kb import complete"
    );
    Ok(summary)
}

/// Import questions from a JSON or plain-text file. Returns the number added.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn import_questions_file(storage: &Storage, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path).map_err(|e| SecqError::io(path, e))?;
    let records = parse_questions(&content, QuestionFileFormat::from_path(path))?;
    import_question_records(storage, records).await
}

/// Store parsed questions. Creation times strictly increase in file order.
pub async fn import_question_records(
    storage: &Storage,
    records: Vec<QuestionImportRecord>,
) -> Result<usize> {
    let base = now();
    let count = records.len();

    for (i, record) in records.into_iter().enumerate() {
        let mut question = SecurityQuestion::new(record.text, record.category);
        question.created_at = base + Duration::microseconds(i as i64);
        storage.insert_question(&question).await?;
    }

    info!(count, "question import complete");
    Ok(count)
}
