//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding knowledge base
//! entries, questionnaire questions, generated answers, and run history.
//!
//! **Access rules:**
//! - Mutating CLI commands: read-write via [`Storage::open`]
//! - Listing/export commands: read-only via [`Storage::open_readonly`]
//!
//! Every `list_*` call returns records in creation order (`created_at`, then
//! insertion order).

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use libsql::{Connection, Database, Row, params};
use secq_shared::{
    GeneratedAnswer, GenerationRun, KbEntryPatch, KnowledgeBaseEntry, Result, RunStatus, SecqError,
    SecurityQuestion, format_timestamp, new_record_id, now, parse_timestamp,
};

const KB_ENTRY: &str = "kb entry";
const QUESTION: &str = "question";

/// Error recorded on `running` rows closed by the stale-run cutoff.
const ABANDONED_RUN_ERROR: &str = "abandoned: still running past the stale-run cutoff";

/// How long a write waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const KB_COLUMNS: &str = "id, category, question, answer, created_at, updated_at";
const QUESTION_COLUMNS: &str = "id, text, category, created_at";
const ANSWER_COLUMNS: &str = "id, question_id, question_text, answer_text, category, created_at";
const RUN_COLUMNS: &str = "id, started_at, finished_at, status, generated, error, stats_json";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> SecqError {
    SecqError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SecqError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SecqError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SecqError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SecqError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Knowledge base entries
    // -----------------------------------------------------------------------

    /// Insert a new entry. Fails with [`SecqError::Conflict`] if the id exists.
    pub async fn insert_kb_entry(&self, entry: &KnowledgeBaseEntry) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "INSERT INTO kb_entries (id, category, question, answer, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    entry.id.as_str(),
                    entry.category.as_str(),
                    entry.question.as_str(),
                    entry.answer.as_str(),
                    format_timestamp(&entry.created_at),
                    format_timestamp(&entry.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(SecqError::Conflict {
                kind: KB_ENTRY,
                id: entry.id.clone(),
            });
        }
        Ok(())
    }

    /// Insert or replace the content of an entry, keeping the original `created_at`.
    pub async fn upsert_kb_entry(&self, entry: &KnowledgeBaseEntry) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO kb_entries (id, category, question, answer, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   category = excluded.category,
                   question = excluded.question,
                   answer = excluded.answer,
                   updated_at = excluded.updated_at",
                params![
                    entry.id.as_str(),
                    entry.category.as_str(),
                    entry.question.as_str(),
                    entry.answer.as_str(),
                    format_timestamp(&entry.created_at),
                    format_timestamp(&entry.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get an entry by id.
    pub async fn get_kb_entry(&self, id: &str) -> Result<Option<KnowledgeBaseEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {KB_COLUMNS} FROM kb_entries WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_kb_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List entries in creation order, optionally restricted to one category.
    pub async fn list_kb_entries(&self, category: Option<&str>) -> Result<Vec<KnowledgeBaseEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {KB_COLUMNS} FROM kb_entries
                     WHERE ?1 IS NULL OR category = ?1
                     ORDER BY created_at, rowid"
                ),
                params![category],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_kb_entry(&row)?);
        }
        Ok(results)
    }

    /// Apply a partial update and advance `updated_at`.
    ///
    /// An empty patch changes nothing and returns the stored entry.
    pub async fn update_kb_entry(&self, id: &str, patch: &KbEntryPatch) -> Result<KnowledgeBaseEntry> {
        self.check_writable()?;
        let not_found = || SecqError::NotFound {
            kind: KB_ENTRY,
            id: id.to_string(),
        };

        if patch.is_empty() {
            return self.get_kb_entry(id).await?.ok_or_else(not_found);
        }

        let affected = self
            .conn
            .execute(
                "UPDATE kb_entries SET
                   category = COALESCE(?1, category),
                   question = COALESCE(?2, question),
                   answer = COALESCE(?3, answer),
                   updated_at = ?4
                 WHERE id = ?5",
                params![
                    patch.category.as_deref(),
                    patch.question.as_deref(),
                    patch.answer.as_deref(),
                    format_timestamp(&now()),
                    id,
                ],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(not_found());
        }
        self.get_kb_entry(id).await?.ok_or_else(not_found)
    }

    /// Delete an entry by id.
    pub async fn delete_kb_entry(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM kb_entries WHERE id = ?1", params![id])
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(SecqError::NotFound {
                kind: KB_ENTRY,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete every entry. Returns the number removed.
    pub async fn delete_all_kb_entries(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM kb_entries", params![])
            .await
            .map_err(db_err)
    }

    // -----------------------------------------------------------------------
    // Questions
    // -----------------------------------------------------------------------

    /// Insert a new question. Fails with [`SecqError::Conflict`] if the id exists.
    pub async fn insert_question(&self, question: &SecurityQuestion) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "INSERT INTO questions (id, text, category, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    question.id.as_str(),
                    question.text.as_str(),
                    question.category.as_deref(),
                    format_timestamp(&question.created_at),
                ],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(SecqError::Conflict {
                kind: QUESTION,
                id: question.id.clone(),
            });
        }
        Ok(())
    }

    /// Get a question by id.
    pub async fn get_question(&self, id: &str) -> Result<Option<SecurityQuestion>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_question(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List all questions in creation order.
    pub async fn list_questions(&self) -> Result<Vec<SecurityQuestion>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions ORDER BY created_at, rowid"),
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_question(&row)?);
        }
        Ok(results)
    }

    /// Delete a question by id. Answers generated from it are kept.
    pub async fn delete_question(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM questions WHERE id = ?1", params![id])
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(SecqError::NotFound {
                kind: QUESTION,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete every question. Returns the number removed.
    pub async fn delete_all_questions(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM questions", params![])
            .await
            .map_err(db_err)
    }

    // -----------------------------------------------------------------------
    // Generated answers
    // -----------------------------------------------------------------------

    /// Persist one generated answer.
    pub async fn insert_answer(&self, answer: &GeneratedAnswer) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO generated_answers (id, question_id, question_text, answer_text, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    answer.id.as_str(),
                    answer.question_id.as_str(),
                    answer.question_text.as_str(),
                    answer.answer_text.as_str(),
                    answer.category.as_deref(),
                    format_timestamp(&answer.created_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// List answers in the order they were persisted.
    pub async fn list_answers(&self) -> Result<Vec<GeneratedAnswer>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM generated_answers ORDER BY created_at, rowid"
                ),
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_answer(&row)?);
        }
        Ok(results)
    }

    /// Number of stored answers.
    pub async fn count_answers(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM generated_answers", params![])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as usize),
            None => Ok(0),
        }
    }

    /// Delete every generated answer. Returns the number removed.
    pub async fn delete_all_answers(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM generated_answers", params![])
            .await
            .map_err(db_err)
    }

    // -----------------------------------------------------------------------
    // Generation runs
    // -----------------------------------------------------------------------

    /// Claim the generation slot and record the start of a run.
    ///
    /// Runs one `BEGIN IMMEDIATE` transaction, so handles on the same database
    /// file see each other's claims. `running` rows that started before
    /// `stale_before` are closed as failed first. Any other `running` row
    /// means a run is in flight and yields [`SecqError::GenerationInProgress`].
    /// Returns the new run ID.
    pub async fn begin_generation_run(&self, stale_before: DateTime<Utc>) -> Result<String> {
        self.check_writable()?;
        self.conn
            .execute("BEGIN IMMEDIATE", params![])
            .await
            .map_err(db_err)?;

        match self.claim_generation_slot(stale_before).await {
            Ok(id) => {
                self.conn.execute("COMMIT", params![]).await.map_err(db_err)?;
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute("ROLLBACK", params![]).await {
                    tracing::warn!(error = %rollback, "rollback of run claim failed");
                }
                Err(e)
            }
        }
    }

    async fn claim_generation_slot(&self, stale_before: DateTime<Utc>) -> Result<String> {
        let ts = format_timestamp(&now());
        let abandoned = self
            .conn
            .execute(
                "UPDATE generation_runs
                 SET status = ?1, finished_at = ?2, error = ?3
                 WHERE status = ?4 AND started_at < ?5",
                params![
                    RunStatus::Failed.as_str(),
                    ts.as_str(),
                    ABANDONED_RUN_ERROR,
                    RunStatus::Running.as_str(),
                    format_timestamp(&stale_before),
                ],
            )
            .await
            .map_err(db_err)?;
        if abandoned > 0 {
            tracing::warn!(abandoned, "closed stale generation runs");
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM generation_runs WHERE status = ?1 LIMIT 1",
                params![RunStatus::Running.as_str()],
            )
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let holder = get_string(&row, 0)?;
            tracing::debug!(run_id = %holder, "generation slot already claimed");
            return Err(SecqError::GenerationInProgress);
        }

        let id = new_record_id();
        self.conn
            .execute(
                "INSERT INTO generation_runs (id, started_at, status) VALUES (?1, ?2, ?3)",
                params![id.as_str(), ts.as_str(), RunStatus::Running.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Close a generation run with its outcome.
    pub async fn finish_generation_run(
        &self,
        run_id: &str,
        status: RunStatus,
        generated: usize,
        error: Option<&str>,
        stats_json: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE generation_runs
                 SET finished_at = ?1, status = ?2, generated = ?3, error = ?4, stats_json = ?5
                 WHERE id = ?6",
                params![
                    format_timestamp(&now()),
                    status.as_str(),
                    generated as i64,
                    error,
                    stats_json,
                    run_id,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_generation_runs(&self, limit: u32) -> Result<Vec<GenerationRun>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM generation_runs
                     ORDER BY started_at DESC, rowid DESC
                     LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn get_string(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(db_err)
}

fn get_timestamp(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    parse_timestamp(&get_string(row, idx)?)
}

/// Convert a database row to a [`KnowledgeBaseEntry`].
fn row_to_kb_entry(row: &Row) -> Result<KnowledgeBaseEntry> {
    Ok(KnowledgeBaseEntry {
        id: get_string(row, 0)?,
        category: get_string(row, 1)?,
        question: get_string(row, 2)?,
        answer: get_string(row, 3)?,
        created_at: get_timestamp(row, 4)?,
        updated_at: get_timestamp(row, 5)?,
    })
}

/// Convert a database row to a [`SecurityQuestion`].
fn row_to_question(row: &Row) -> Result<SecurityQuestion> {
    Ok(SecurityQuestion {
        id: get_string(row, 0)?,
        text: get_string(row, 1)?,
        category: row.get::<String>(2).ok(),
        created_at: get_timestamp(row, 3)?,
    })
}

/// Convert a database row to a [`GeneratedAnswer`].
fn row_to_answer(row: &Row) -> Result<GeneratedAnswer> {
    Ok(GeneratedAnswer {
        id: get_string(row, 0)?,
        question_id: get_string(row, 1)?,
        question_text: get_string(row, 2)?,
        answer_text: get_string(row, 3)?,
        category: row.get::<String>(4).ok(),
        created_at: get_timestamp(row, 5)?,
    })
}

/// Convert a database row to a [`GenerationRun`].
fn row_to_run(row: &Row) -> Result<GenerationRun> {
    let finished_at = match row.get::<String>(2).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };
    Ok(GenerationRun {
        id: get_string(row, 0)?,
        started_at: get_timestamp(row, 1)?,
        finished_at,
        status: get_string(row, 3)?.parse()?,
        generated: row.get::<i64>(4).map_err(db_err)? as usize,
        error: row.get::<String>(5).ok(),
        stats_json: row.get::<String>(6).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("secq_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn answer(question_id: &str) -> GeneratedAnswer {
        GeneratedAnswer {
            id: new_record_id(),
            question_id: question_id.into(),
            question_text: "Do you encrypt data?".into(),
            answer_text: "Yes.".into(),
            category: Some("Encryption".into()),
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("secq_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn kb_entry_crud() {
        let storage = test_storage().await;
        let entry = KnowledgeBaseEntry::new("Access Management", "Is MFA enforced?", "Yes, for all staff.");

        storage.insert_kb_entry(&entry).await.expect("insert entry");
        let found = storage.get_kb_entry(&entry.id).await.expect("get entry");
        assert_eq!(found.as_ref(), Some(&entry));

        let dup = storage.insert_kb_entry(&entry).await;
        assert!(matches!(dup, Err(SecqError::Conflict { .. })));

        storage.delete_kb_entry(&entry.id).await.expect("delete entry");
        assert!(storage.get_kb_entry(&entry.id).await.unwrap().is_none());

        let missing = storage.delete_kb_entry(&entry.id).await;
        assert!(matches!(missing, Err(SecqError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_keeps_created_at_and_advances_updated_at() {
        let storage = test_storage().await;
        let mut entry = KnowledgeBaseEntry::new("Logging", "Are logs kept?", "For 90 days.");
        entry.created_at -= Duration::hours(1);
        entry.updated_at = entry.created_at;
        storage.insert_kb_entry(&entry).await.unwrap();

        let patch = KbEntryPatch {
            answer: Some("For 365 days.".into()),
            ..Default::default()
        };
        let updated = storage.update_kb_entry(&entry.id, &patch).await.expect("update");
        assert_eq!(updated.answer, "For 365 days.");
        assert_eq!(updated.question, "Are logs kept?");
        assert_eq!(updated.created_at, entry.created_at);
        assert!(updated.updated_at > entry.updated_at);

        let missing = storage.update_kb_entry("nope", &patch).await;
        assert!(matches!(missing, Err(SecqError::NotFound { .. })));
    }

    #[tokio::test]
    async fn upsert_preserves_created_at() {
        let storage = test_storage().await;
        let entry = KnowledgeBaseEntry::new("Privacy", "Do you sell data?", "No.");
        storage.upsert_kb_entry(&entry).await.expect("first upsert");

        let mut replacement = entry.clone();
        replacement.answer = "Never.".into();
        replacement.created_at += Duration::days(1);
        replacement.updated_at = replacement.created_at;
        storage.upsert_kb_entry(&replacement).await.expect("second upsert");

        let stored = storage.get_kb_entry(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.answer, "Never.");
        assert_eq!(stored.created_at, entry.created_at);
        assert_eq!(stored.updated_at, replacement.updated_at);
    }

    #[tokio::test]
    async fn list_kb_entries_in_creation_order_with_filter() {
        let storage = test_storage().await;
        let base = now();
        for (i, category) in ["Network", "Privacy", "Network"].iter().enumerate() {
            let mut entry = KnowledgeBaseEntry::new(*category, format!("q{i}"), format!("a{i}"));
            // Insert newest first to prove ordering comes from created_at.
            entry.created_at = base - Duration::seconds(i as i64);
            entry.updated_at = entry.created_at;
            storage.insert_kb_entry(&entry).await.unwrap();
        }

        let all = storage.list_kb_entries(None).await.expect("list all");
        let questions: Vec<&str> = all.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q1", "q0"]);

        let network = storage.list_kb_entries(Some("Network")).await.expect("list filtered");
        assert_eq!(network.len(), 2);
        assert!(network.iter().all(|e| e.category == "Network"));
    }

    #[tokio::test]
    async fn question_crud() {
        let storage = test_storage().await;
        let q1 = SecurityQuestion::new("Do you run pentests?", None);
        let q2 = SecurityQuestion::new("Is data encrypted?", Some("Encryption".into()));
        storage.insert_question(&q1).await.expect("insert q1");
        storage.insert_question(&q2).await.expect("insert q2");

        let dup = storage.insert_question(&q1).await;
        assert!(matches!(dup, Err(SecqError::Conflict { .. })));

        let listed = storage.list_questions().await.expect("list");
        assert_eq!(listed, vec![q1.clone(), q2.clone()]);

        let found = storage.get_question(&q2.id).await.unwrap().unwrap();
        assert_eq!(found.category.as_deref(), Some("Encryption"));

        storage.delete_question(&q1.id).await.expect("delete");
        assert!(matches!(
            storage.delete_question(&q1.id).await,
            Err(SecqError::NotFound { .. })
        ));
        assert_eq!(storage.delete_all_questions().await.unwrap(), 1);
        assert!(storage.list_questions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn answers_insert_count_and_wipe() {
        let storage = test_storage().await;
        let a1 = answer("q1");
        let a2 = GeneratedAnswer {
            category: None,
            ..answer("q2")
        };
        storage.insert_answer(&a1).await.expect("insert a1");
        storage.insert_answer(&a2).await.expect("insert a2");

        assert_eq!(storage.count_answers().await.unwrap(), 2);
        let listed = storage.list_answers().await.unwrap();
        assert_eq!(listed, vec![a1, a2]);

        assert_eq!(storage.delete_all_answers().await.unwrap(), 2);
        assert_eq!(storage.count_answers().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn answers_survive_question_deletion() {
        let storage = test_storage().await;
        let q = SecurityQuestion::new("Do you have a SOC 2 report?", None);
        storage.insert_question(&q).await.unwrap();
        storage.insert_answer(&answer(&q.id)).await.unwrap();

        storage.delete_question(&q.id).await.unwrap();
        assert_eq!(storage.count_answers().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn generation_run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage
            .begin_generation_run(now() - Duration::hours(1))
            .await
            .expect("begin run");
        assert!(!run_id.is_empty());

        let runs = storage.list_generation_runs(10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Running);
        assert!(runs[0].finished_at.is_none());

        storage
            .finish_generation_run(&run_id, RunStatus::Failed, 1, Some("rate limited"), None)
            .await
            .expect("finish run");

        let runs = storage.list_generation_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].generated, 1);
        assert_eq!(runs[0].error.as_deref(), Some("rate limited"));
        assert!(runs[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn running_run_blocks_second_claim() {
        let storage = test_storage().await;
        let cutoff = now() - Duration::hours(1);
        let first = storage.begin_generation_run(cutoff).await.expect("first claim");

        let err = storage.begin_generation_run(cutoff).await.unwrap_err();
        assert!(matches!(err, SecqError::GenerationInProgress));
        assert_eq!(storage.list_generation_runs(10).await.unwrap().len(), 1);

        storage
            .finish_generation_run(&first, RunStatus::Completed, 3, None, None)
            .await
            .unwrap();
        storage
            .begin_generation_run(cutoff)
            .await
            .expect("claim after finish");
    }

    #[tokio::test]
    async fn stale_running_row_is_abandoned() {
        let storage = test_storage().await;
        let stale = storage
            .begin_generation_run(now() - Duration::hours(1))
            .await
            .unwrap();

        // Everything started before "now + 1s" counts as stale.
        let fresh = storage
            .begin_generation_run(now() + Duration::seconds(1))
            .await
            .expect("claim past stale run");
        assert_ne!(stale, fresh);

        let runs = storage.list_generation_runs(10).await.unwrap();
        let old = runs.iter().find(|r| r.id == stale).unwrap();
        assert_eq!(old.status, RunStatus::Failed);
        assert!(old.error.as_deref().unwrap().starts_with("abandoned"));
        assert!(old.finished_at.is_some());
        let new = runs.iter().find(|r| r.id == fresh).unwrap();
        assert_eq!(new.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn run_claim_is_shared_across_handles() {
        let tmp = std::env::temp_dir().join(format!("secq_test_{}.db", Uuid::now_v7()));
        let a = Storage::open(&tmp).await.unwrap();
        let b = Storage::open(&tmp).await.unwrap();
        let cutoff = now() - Duration::hours(1);

        a.begin_generation_run(cutoff).await.expect("claim on a");
        let err = b.begin_generation_run(cutoff).await.unwrap_err();
        assert!(matches!(err, SecqError::GenerationInProgress));
    }

    #[tokio::test]
    async fn delete_all_kb_entries_empties_table() {
        let storage = test_storage().await;
        for i in 0..3 {
            storage
                .insert_kb_entry(&KnowledgeBaseEntry::new("Network", format!("q{i}"), "a"))
                .await
                .unwrap();
        }
        assert_eq!(storage.delete_all_kb_entries().await.unwrap(), 3);
        assert!(storage.list_kb_entries(None).await.unwrap().is_empty());
        assert_eq!(storage.delete_all_kb_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("secq_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_question(&SecurityQuestion::new("q", None))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_questions().await.unwrap().len(), 1);
        let result = ro.insert_question(&SecurityQuestion::new("q2", None)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("secq_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
