//! The record-store surface the generation pipeline depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secq_shared::{GeneratedAnswer, KnowledgeBaseEntry, Result, RunStatus, SecurityQuestion};
use secq_storage::Storage;

/// Reads questions and knowledge base entries, replaces generated answers,
/// and keeps run history.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// All questions, creation order.
    async fn list_questions(&self) -> Result<Vec<SecurityQuestion>>;

    /// All knowledge base entries, creation order.
    async fn list_kb_entries(&self) -> Result<Vec<KnowledgeBaseEntry>>;

    /// Remove every generated answer. Returns the number removed.
    async fn delete_all_answers(&self) -> Result<u64>;

    /// Persist one answer immediately.
    async fn insert_answer(&self, answer: &GeneratedAnswer) -> Result<()>;

    /// Claim the generation slot and open a run history record. Returns its id.
    ///
    /// Fails with `GenerationInProgress` while another run that started at or
    /// after `stale_before` is still open.
    async fn begin_run(&self, stale_before: DateTime<Utc>) -> Result<String>;

    /// Close a run history record.
    async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        generated: usize,
        error: Option<&str>,
        stats_json: Option<&str>,
    ) -> Result<()>;
}

#[async_trait]
impl AnswerStore for Storage {
    async fn list_questions(&self) -> Result<Vec<SecurityQuestion>> {
        Storage::list_questions(self).await
    }

    async fn list_kb_entries(&self) -> Result<Vec<KnowledgeBaseEntry>> {
        Storage::list_kb_entries(self, None).await
    }

    async fn delete_all_answers(&self) -> Result<u64> {
        Storage::delete_all_answers(self).await
    }

    async fn insert_answer(&self, answer: &GeneratedAnswer) -> Result<()> {
        Storage::insert_answer(self, answer).await
    }

    async fn begin_run(&self, stale_before: DateTime<Utc>) -> Result<String> {
        self.begin_generation_run(stale_before).await
    }

    async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        generated: usize,
        error: Option<&str>,
        stats_json: Option<&str>,
    ) -> Result<()> {
        self.finish_generation_run(run_id, status, generated, error, stats_json)
            .await
    }
}
