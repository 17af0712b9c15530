//! SQL migration definitions for the SecQ database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: kb_entries, questions, generated_answers, generation_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Curated reference question/answer pairs
CREATE TABLE IF NOT EXISTS kb_entries (
    id         TEXT PRIMARY KEY,
    category   TEXT NOT NULL,
    question   TEXT NOT NULL,
    answer     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kb_entries_created ON kb_entries(created_at);
CREATE INDEX IF NOT EXISTS idx_kb_entries_category ON kb_entries(category);

-- Questionnaire questions awaiting answers
CREATE TABLE IF NOT EXISTS questions (
    id         TEXT PRIMARY KEY,
    text       TEXT NOT NULL,
    category   TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_created ON questions(created_at);

-- Generated answers; question_text is a snapshot, so no FK to questions
CREATE TABLE IF NOT EXISTS generated_answers (
    id            TEXT PRIMARY KEY,
    question_id   TEXT NOT NULL,
    question_text TEXT NOT NULL,
    answer_text   TEXT NOT NULL,
    category      TEXT,
    created_at    TEXT NOT NULL
);

-- Generation run history
CREATE TABLE IF NOT EXISTS generation_runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT NOT NULL,
    generated   INTEGER NOT NULL DEFAULT 0,
    error       TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_generation_runs_started ON generation_runs(started_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
