//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use secq_core::export::{ExportFormat, render_answers};
use secq_core::import::{import_kb_file, import_questions_file};
use secq_core::{GenerationOptions, GenerationProgress, GenerationReport, Generator};
use secq_llm::{OpenRouterClient, OpenRouterSettings};
use secq_shared::{
    AppConfig, KbEntryPatch, KnowledgeBaseEntry, SecqError, SecurityQuestion, expand_home,
    format_timestamp, init_config, load_config, validate_api_key,
};
use secq_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SecQ: grounded answers for security questionnaires.
#[derive(Parser)]
#[command(
    name = "secq",
    version,
    about = "Answer security questionnaires from a curated knowledge base.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database path (overrides `defaults.database_path`).
    #[arg(long, env = "SECQ_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Answer export format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum AnswerFormat {
    Json,
    Markdown,
}

impl From<AnswerFormat> for ExportFormat {
    fn from(format: AnswerFormat) -> Self {
        match format {
            AnswerFormat::Json => ExportFormat::Json,
            AnswerFormat::Markdown => ExportFormat::Markdown,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Manage knowledge base entries.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Manage the questions to be answered.
    Questions {
        #[command(subcommand)]
        action: QuestionAction,
    },

    /// Regenerate answers for every question (replaces all existing answers).
    Generate {
        /// Knowledge base entries given to the model per question.
        #[arg(long)]
        max_context: Option<usize>,

        /// OpenRouter model id (overrides `openrouter.default_model`).
        #[arg(long)]
        model: Option<String>,
    },

    /// Inspect or export generated answers.
    Answers {
        #[command(subcommand)]
        action: AnswerAction,
    },

    /// Inspect generation run history.
    Runs {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Knowledge base subcommands.
#[derive(Subcommand)]
pub(crate) enum KbAction {
    /// Add an entry.
    Add {
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        question: String,
        #[arg(short, long)]
        answer: String,
    },
    /// List entries in creation order.
    List {
        /// Only entries in this category.
        #[arg(short, long)]
        category: Option<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one entry.
    Show { id: String },
    /// Change fields of an entry.
    Update {
        id: String,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        question: Option<String>,
        #[arg(short, long)]
        answer: Option<String>,
    },
    /// Delete an entry.
    Delete { id: String },
    /// Delete every entry.
    Clear,
    /// Import entries from a JSON file.
    Import { file: PathBuf },
}

/// Question subcommands.
#[derive(Subcommand)]
pub(crate) enum QuestionAction {
    /// Add a question.
    Add {
        text: String,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List questions in answering order.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a question.
    Delete { id: String },
    /// Delete every question.
    Clear,
    /// Import questions from a JSON file or a text file (one per line).
    Import { file: PathBuf },
}

/// Answer subcommands.
#[derive(Subcommand)]
pub(crate) enum AnswerAction {
    /// Print answers from the last run.
    List,
    /// Export answers to a file or stdout.
    Export {
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: AnswerFormat,
        /// Output path. Prints to stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// Run history subcommands.
#[derive(Subcommand)]
pub(crate) enum RunAction {
    /// List recent runs, newest first.
    List {
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "secq=info",
        1 => "secq=debug",
        _ => "secq=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Kb { action } => match action {
            KbAction::Add {
                category,
                question,
                answer,
            } => cmd_kb_add(db, &category, &question, &answer).await,
            KbAction::List { category, json } => cmd_kb_list(db, category.as_deref(), json).await,
            KbAction::Show { id } => cmd_kb_show(db, &id).await,
            KbAction::Update {
                id,
                category,
                question,
                answer,
            } => {
                let patch = KbEntryPatch {
                    category,
                    question,
                    answer,
                };
                cmd_kb_update(db, &id, patch).await
            }
            KbAction::Delete { id } => cmd_kb_delete(db, &id).await,
            KbAction::Clear => cmd_kb_clear(db).await,
            KbAction::Import { file } => cmd_kb_import(db, &file).await,
        },
        Command::Questions { action } => match action {
            QuestionAction::Add { text, category } => cmd_question_add(db, &text, category).await,
            QuestionAction::List { json } => cmd_question_list(db, json).await,
            QuestionAction::Delete { id } => cmd_question_delete(db, &id).await,
            QuestionAction::Clear => cmd_question_clear(db).await,
            QuestionAction::Import { file } => cmd_question_import(db, &file).await,
        },
        Command::Generate { max_context, model } => cmd_generate(db, max_context, model).await,
        Command::Answers { action } => match action {
            AnswerAction::List => cmd_answers_list(db).await,
            AnswerAction::Export { format, out } => {
                cmd_answers_export(db, format.into(), out.as_deref()).await
            }
        },
        Command::Runs { action } => match action {
            RunAction::List { limit } => cmd_runs_list(db, limit).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the database path: `--db` wins over the config file.
fn resolve_db_path(db: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(expand_home(&config.defaults.database_path)?),
    }
}

async fn open_store(db: Option<PathBuf>) -> Result<Storage> {
    let config = load_config()?;
    let path = resolve_db_path(db, &config)?;
    Ok(Storage::open(&path).await?)
}

async fn open_store_readonly(db: Option<PathBuf>) -> Result<Storage> {
    let config = load_config()?;
    let path = resolve_db_path(db, &config)?;
    Ok(Storage::open_readonly(&path).await?)
}

fn require_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SecqError::validation(format!("{field} must not be blank")).into());
    }
    Ok(value.to_string())
}

fn print_entry(entry: &KnowledgeBaseEntry) {
    println!("  ID:       {}", entry.id);
    println!("  Category: {}", entry.category);
    println!("  Question: {}", entry.question);
    println!("  Answer:   {}", entry.answer);
    println!("  Created:  {}", format_timestamp(&entry.created_at));
    println!("  Updated:  {}", format_timestamp(&entry.updated_at));
}

fn print_question(question: &SecurityQuestion) {
    match &question.category {
        Some(category) => println!("{}  [{category}]  {}", question.id, question.text),
        None => println!("{}  {}", question.id, question.text),
    }
}

// ---------------------------------------------------------------------------
// Knowledge base commands
// ---------------------------------------------------------------------------

async fn cmd_kb_add(db: Option<PathBuf>, category: &str, question: &str, answer: &str) -> Result<()> {
    let entry = KnowledgeBaseEntry::new(
        require_text("category", category)?,
        require_text("question", question)?,
        require_text("answer", answer)?,
    );
    let storage = open_store(db).await?;
    storage.insert_kb_entry(&entry).await?;

    info!(id = %entry.id, category = %entry.category, "added kb entry");
    println!("Added knowledge base entry {}", entry.id);
    Ok(())
}

async fn cmd_kb_list(db: Option<PathBuf>, category: Option<&str>, json: bool) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let entries = storage.list_kb_entries(category).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No knowledge base entries.");
        return Ok(());
    }
    for entry in &entries {
        println!("{}  [{}]  {}", entry.id, entry.category, entry.question);
    }
    println!();
    println!("  {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}

async fn cmd_kb_show(db: Option<PathBuf>, id: &str) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let entry = storage
        .get_kb_entry(id)
        .await?
        .ok_or_else(|| SecqError::NotFound {
            kind: "kb entry",
            id: id.to_string(),
        })?;
    print_entry(&entry);
    Ok(())
}

async fn cmd_kb_update(db: Option<PathBuf>, id: &str, patch: KbEntryPatch) -> Result<()> {
    if patch.is_empty() {
        return Err(eyre!(
            "nothing to update: pass at least one of --category, --question, --answer"
        ));
    }
    let patch = KbEntryPatch {
        category: patch.category.map(|v| require_text("category", &v)).transpose()?,
        question: patch.question.map(|v| require_text("question", &v)).transpose()?,
        answer: patch.answer.map(|v| require_text("answer", &v)).transpose()?,
    };

    let storage = open_store(db).await?;
    let entry = storage.update_kb_entry(id, &patch).await?;
    info!(id, "updated kb entry");
    print_entry(&entry);
    Ok(())
}

async fn cmd_kb_delete(db: Option<PathBuf>, id: &str) -> Result<()> {
    let storage = open_store(db).await?;
    storage.delete_kb_entry(id).await?;
    println!("Deleted knowledge base entry {id}");
    Ok(())
}

async fn cmd_kb_clear(db: Option<PathBuf>) -> Result<()> {
    let storage = open_store(db).await?;
    let removed = storage.delete_all_kb_entries().await?;
    info!(removed, "cleared knowledge base");
    println!("Deleted {removed} knowledge base entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

async fn cmd_kb_import(db: Option<PathBuf>, file: &Path) -> Result<()> {
    let storage = open_store(db).await?;
    let summary = import_kb_file(&storage, file).await?;
    println!(
        "Imported {} new and {} updated knowledge base entries",
        summary.inserted, summary.updated
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Question commands
// ---------------------------------------------------------------------------

async fn cmd_question_add(db: Option<PathBuf>, text: &str, category: Option<String>) -> Result<()> {
    let category = category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let question = SecurityQuestion::new(require_text("question text", text)?, category);
    let storage = open_store(db).await?;
    storage.insert_question(&question).await?;

    info!(id = %question.id, "added question");
    println!("Added question {}", question.id);
    Ok(())
}

async fn cmd_question_list(db: Option<PathBuf>, json: bool) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let questions = storage.list_questions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
        return Ok(());
    }
    if questions.is_empty() {
        println!("No questions.");
        return Ok(());
    }
    for question in &questions {
        print_question(question);
    }
    Ok(())
}

async fn cmd_question_delete(db: Option<PathBuf>, id: &str) -> Result<()> {
    let storage = open_store(db).await?;
    storage.delete_question(id).await?;
    println!("Deleted question {id}");
    Ok(())
}

async fn cmd_question_clear(db: Option<PathBuf>) -> Result<()> {
    let storage = open_store(db).await?;
    let removed = storage.delete_all_questions().await?;
    println!("Deleted {removed} question(s)");
    Ok(())
}

async fn cmd_question_import(db: Option<PathBuf>, file: &Path) -> Result<()> {
    let storage = open_store(db).await?;
    let count = import_questions_file(&storage, file).await?;
    println!("Imported {count} question(s)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

async fn cmd_generate(
    db: Option<PathBuf>,
    max_context: Option<usize>,
    model: Option<String>,
) -> Result<()> {
    // Validate API key before touching the database
    let config = load_config()?;
    validate_api_key(&config)?;
    let path = resolve_db_path(db, &config)?;

    let mut settings = OpenRouterSettings::from(&config.openrouter);
    if let Some(model) = model {
        settings.model = model;
    }
    let client = OpenRouterClient::new(settings)?;

    let options = GenerationOptions {
        max_context_entries: max_context.unwrap_or(config.defaults.max_context_entries),
        stale_run_after: Duration::from_secs(config.defaults.stale_run_minutes * 60),
    };

    let storage = Storage::open(&path).await?;

    info!(
        db = %path.display(),
        model = client.model(),
        max_context = options.max_context_entries,
        "starting generation"
    );

    let generator = Generator::new(&storage, &client, options);
    let reporter = CliProgress::new();
    let report = match generator.run(&reporter).await {
        Ok(report) => report,
        Err(e) => {
            reporter.abandon();
            return Err(e.into());
        }
    };

    println!();
    println!("  Answers generated!");
    println!("  Generated: {}", report.generated);
    println!("  Replaced:  {}", report.replaced);
    println!("  Fallbacks: {}", report.fallbacks);
    println!("  Tokens:    {} in / {} out", report.tokens_in, report.tokens_out);
    if let Some(model) = &report.model {
        println!("  Model:     {model}");
    }
    println!("  Run:       {}", report.run_id);
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl GenerationProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn question_started(&self, current: usize, total: usize, question: &str) {
        let preview: String = question.chars().take(60).collect();
        self.spinner
            .set_message(format!("Answering [{current}/{total}] {preview}"));
    }

    fn done(&self, _report: &GenerationReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Answers & runs
// ---------------------------------------------------------------------------

async fn cmd_answers_list(db: Option<PathBuf>) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let answers = storage.list_answers().await?;

    if answers.is_empty() {
        println!("No answers. Run `secq generate` first.");
        return Ok(());
    }
    for answer in &answers {
        println!("Q: {}", answer.question_text);
        if let Some(category) = &answer.category {
            println!("   [{category}]");
        }
        println!("A: {}", answer.answer_text);
        println!();
    }
    Ok(())
}

async fn cmd_answers_export(
    db: Option<PathBuf>,
    format: ExportFormat,
    out: Option<&Path>,
) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let answers = storage.list_answers().await?;
    let rendered = render_answers(&answers, format)?;

    match out {
        Some(path) => {
            std::fs::write(path, rendered).map_err(|e| SecqError::io(path, e))?;
            info!(path = %path.display(), count = answers.len(), "exported answers");
            println!("Exported {} answer(s) to {}", answers.len(), path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

async fn cmd_runs_list(db: Option<PathBuf>, limit: u32) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let runs = storage.list_generation_runs(limit).await?;

    if runs.is_empty() {
        println!("No generation runs recorded.");
        return Ok(());
    }
    for run in &runs {
        let finished = run
            .finished_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<9}  {:>4} answer(s)  started {}  finished {}",
            run.id,
            run.status.as_str(),
            run.generated,
            format_timestamp(&run.started_at),
            finished
        );
        if let Some(error) = &run.error {
            println!("    error: {error}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    match validate_api_key(&config) {
        Ok(()) => println!("# API key: set (${})", config.openrouter.api_key_env),
        Err(_) => println!("# API key: NOT SET (${})", config.openrouter.api_key_env),
    }
    Ok(())
}
