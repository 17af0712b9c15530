//! Full-batch answer generation.
//!
//! A run replaces every generated answer: it checks preconditions, claims the
//! store's generation slot, wipes the answer store, then walks the questions in
//! creation order one at a time (select context → compose prompt → one
//! completion call → resolve category → persist). The first failure aborts the run; answers persisted before it stay
//! in the store until the next run wipes them.

use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, info, instrument, warn};

use secq_llm::GenerationService;
use secq_retrieval::select_context;
use secq_shared::{
    DEFAULT_MAX_CONTEXT_ENTRIES, DEFAULT_STALE_RUN_MINUTES, GeneratedAnswer, KnowledgeBaseEntry,
    Result, RunStatus, SecqError, SecurityQuestion, now,
};

use crate::category::resolve_category;
use crate::prompt::{NO_INFORMATION_ANSWER, compose_prompt};
use crate::store::AnswerStore;

// ---------------------------------------------------------------------------
// Options & report
// ---------------------------------------------------------------------------

/// Tunables for a generation run.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Knowledge base entries handed to the model per question.
    pub max_context_entries: usize,
    /// Age after which another process's unfinished run no longer blocks a new one.
    pub stale_run_after: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_context_entries: DEFAULT_MAX_CONTEXT_ENTRIES,
            stale_run_after: Duration::from_secs(DEFAULT_STALE_RUN_MINUTES * 60),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// Run history id.
    pub run_id: String,
    /// Answers generated and persisted.
    pub generated: usize,
    /// Answers deleted by the initial reset.
    pub replaced: u64,
    /// Questions answered with the no-information fallback.
    pub fallbacks: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Model reported by the last completion.
    pub model: Option<String>,
    pub elapsed: Duration,
}

impl GenerationReport {
    fn stats_json(&self) -> String {
        serde_json::json!({
            "model": self.model,
            "tokens_in": self.tokens_in,
            "tokens_out": self.tokens_out,
            "fallbacks": self.fallbacks,
            "replaced": self.replaced,
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for generation runs.
pub trait GenerationProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each question is sent to the model.
    fn question_started(&self, current: usize, total: usize, question: &str);
    /// Called when the run completes successfully.
    fn done(&self, report: &GenerationReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl GenerationProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn question_started(&self, _current: usize, _total: usize, _question: &str) {}
    fn done(&self, _report: &GenerationReport) {}
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Drives generation runs against a store and a generation service.
///
/// At most one run is in flight per store: the slot is claimed through
/// [`AnswerStore::begin_run`], so a concurrent run from this or any other
/// process fails with [`SecqError::GenerationInProgress`] before any answer is
/// deleted.
pub struct Generator<'a> {
    store: &'a dyn AnswerStore,
    service: &'a dyn GenerationService,
    options: GenerationOptions,
}

impl<'a> Generator<'a> {
    pub fn new(
        store: &'a dyn AnswerStore,
        service: &'a dyn GenerationService,
        options: GenerationOptions,
    ) -> Self {
        Self {
            store,
            service,
            options,
        }
    }

    /// Regenerate answers for every question.
    #[instrument(skip_all, fields(max_context = self.options.max_context_entries))]
    pub async fn run(&self, progress: &dyn GenerationProgress) -> Result<GenerationReport> {
        let start = Instant::now();

        // --- Preconditions (nothing is deleted if these fail) ---
        if !self.service.has_credential() {
            return Err(SecqError::config(
                "generation service has no API key configured",
            ));
        }

        progress.phase("Loading questions");
        let mut questions = self.store.list_questions().await?;
        if questions.is_empty() {
            return Err(SecqError::empty_input("there are no questions to answer"));
        }
        questions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        progress.phase("Loading knowledge base");
        let entries = self.store.list_kb_entries().await?;

        // --- Single-flight claim ---
        let stale_after = TimeDelta::from_std(self.options.stale_run_after)
            .map_err(|e| SecqError::validation(format!("stale run cutoff out of range: {e}")))?;
        let run_id = self.store.begin_run(now() - stale_after).await?;

        let mut report = GenerationReport {
            run_id,
            ..Default::default()
        };

        // --- Destructive reset ---
        progress.phase("Clearing previous answers");
        report.replaced = match self.store.delete_all_answers().await {
            Ok(n) => n,
            Err(e) => {
                report.elapsed = start.elapsed();
                self.close_failed_run(&report, &e).await;
                return Err(e);
            }
        };

        info!(
            run_id = %report.run_id,
            questions = questions.len(),
            kb_entries = entries.len(),
            replaced = report.replaced,
            "starting generation run"
        );

        // --- Sequential per-question loop ---
        progress.phase("Generating answers");
        let total = questions.len();
        for (i, question) in questions.iter().enumerate() {
            progress.question_started(i + 1, total, &question.text);

            if let Err(e) = self.answer_question(question, &entries, &mut report).await {
                report.elapsed = start.elapsed();
                warn!(
                    question_id = %question.id,
                    generated = report.generated,
                    error = %e,
                    "generation run aborted"
                );
                let err = SecqError::RunAborted {
                    generated: report.generated,
                    question_id: question.id.clone(),
                    source: Box::new(e),
                };
                self.close_failed_run(&report, &err).await;
                return Err(err);
            }
        }

        report.elapsed = start.elapsed();
        self.store
            .finish_run(
                &report.run_id,
                RunStatus::Completed,
                report.generated,
                None,
                Some(&report.stats_json()),
            )
            .await?;
        progress.done(&report);

        info!(
            generated = report.generated,
            fallbacks = report.fallbacks,
            tokens_in = report.tokens_in,
            tokens_out = report.tokens_out,
            elapsed_ms = report.elapsed.as_millis(),
            "generation run complete"
        );

        Ok(report)
    }

    /// Answer one question and persist the result.
    async fn answer_question(
        &self,
        question: &SecurityQuestion,
        entries: &[KnowledgeBaseEntry],
        report: &mut GenerationReport,
    ) -> Result<()> {
        let context = select_context(&question.text, entries, self.options.max_context_entries);
        let prompt = compose_prompt(&question.text, &context);

        let completion = self.service.complete(&prompt.system, &prompt.user).await?;
        report.tokens_in += completion.tokens_in;
        report.tokens_out += completion.tokens_out;
        report.model = Some(completion.model);

        let answer_text = match completion.text.trim() {
            "" => {
                debug!(question_id = %question.id, "empty completion, using fallback answer");
                NO_INFORMATION_ANSWER.to_string()
            }
            text => text.to_string(),
        };
        if answer_text == NO_INFORMATION_ANSWER {
            report.fallbacks += 1;
        }

        let answer = GeneratedAnswer {
            id: mint_answer_id(&question.id),
            question_id: question.id.clone(),
            question_text: question.text.clone(),
            answer_text,
            category: resolve_category(&context, question),
            created_at: now(),
        };

        self.store.insert_answer(&answer).await?;
        report.generated += 1;

        debug!(
            question_id = %question.id,
            answer_id = %answer.id,
            context = context.len(),
            category = answer.category.as_deref().unwrap_or("-"),
            "answer persisted"
        );
        Ok(())
    }

    /// Mark the run failed. The run's own error wins over a failure to record it.
    async fn close_failed_run(&self, report: &GenerationReport, error: &SecqError) {
        let stats = report.stats_json();
        if let Err(e) = self
            .store
            .finish_run(
                &report.run_id,
                RunStatus::Failed,
                report.generated,
                Some(&error.to_string()),
                Some(&stats),
            )
            .await
        {
            warn!(run_id = %report.run_id, error = %e, "could not record generation run failure");
        }
    }
}

// ---------------------------------------------------------------------------
// Id minting
// ---------------------------------------------------------------------------

/// Mint a fresh answer id: a random UUID, or `<unix-millis>-<question_id>` if
/// the OS random source is unavailable.
pub fn mint_answer_id(question_id: &str) -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(e) => {
            warn!(error = %e, "OS randomness unavailable, using timestamp answer id");
            fallback_answer_id(question_id)
        }
    }
}

fn fallback_answer_id(question_id: &str) -> String {
    format!("{}-{question_id}", Utc::now().timestamp_millis())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
