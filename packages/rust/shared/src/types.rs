//! Core domain types for SecQ.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SecqError};

/// Generate a new time-sortable record identifier (UUID v7).
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current time truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage.
///
/// Fixed microsecond precision keeps lexical order equal to chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SecqError::Storage(format!("invalid date '{s}': {e}")))
}

// ---------------------------------------------------------------------------
// KnowledgeBaseEntry
// ---------------------------------------------------------------------------

/// A curated reference question/answer pair used as ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseEntry {
    /// Stable identifier.
    pub id: String,
    /// Category label (e.g. "Access Management").
    pub category: String,
    /// The stored reference question.
    pub question: String,
    /// The authoritative answer text.
    pub answer: String,
    /// Set once at first insertion.
    pub created_at: DateTime<Utc>,
    /// Advances on every content change.
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBaseEntry {
    /// Build a new entry with a fresh id and both timestamps set to now.
    pub fn new(
        category: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        let ts = now();
        Self {
            id: new_record_id(),
            category: category.into(),
            question: question.into(),
            answer: answer.into(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Text used for relevance scoring: the stored question followed by the answer.
    pub fn corpus(&self) -> String {
        format!("{} {}", self.question, self.answer)
    }
}

/// Partial update for a [`KnowledgeBaseEntry`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbEntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl KbEntryPatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.question.is_none() && self.answer.is_none()
    }
}

// ---------------------------------------------------------------------------
// SecurityQuestion
// ---------------------------------------------------------------------------

/// An externally supplied question to be answered by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityQuestion {
    pub id: String,
    /// The question to answer.
    pub text: String,
    /// Optional pre-tagged category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityQuestion {
    /// Build a new question with a fresh id.
    pub fn new(text: impl Into<String>, category: Option<String>) -> Self {
        Self {
            id: new_record_id(),
            text: text.into(),
            category,
            created_at: now(),
        }
    }
}

// ---------------------------------------------------------------------------
// GeneratedAnswer
// ---------------------------------------------------------------------------

/// The pipeline's output for one security question.
///
/// `question_text` is a snapshot taken at generation time, not a live join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    /// Minted fresh on every generation run.
    pub id: String,
    /// Source question (reference only).
    pub question_id: String,
    pub question_text: String,
    /// Model output, or the grounding fallback sentence.
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// GenerationRun
// ---------------------------------------------------------------------------

/// Lifecycle state of a recorded generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = SecqError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(SecqError::Storage(format!("unknown run status '{other}'"))),
        }
    }
}

/// History record for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Answers persisted by this run.
    pub generated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Model and token usage, as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_json: Option<String>,
}
