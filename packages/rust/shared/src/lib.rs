//! Shared types, error model, and configuration for SecQ.
//!
//! This crate is the foundation depended on by all other SecQ crates.
//! It provides:
//! - [`SecqError`]: the unified error type
//! - Domain types ([`KnowledgeBaseEntry`], [`SecurityQuestion`], [`GeneratedAnswer`], [`GenerationRun`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_MAX_CONTEXT_ENTRIES, DEFAULT_STALE_RUN_MINUTES, DefaultsConfig,
    OpenRouterConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_api_key, validate_config,
};
pub use error::{Result, SecqError};
pub use types::{
    GeneratedAnswer, GenerationRun, KbEntryPatch, KnowledgeBaseEntry, RunStatus, SecurityQuestion,
    format_timestamp, new_record_id, now, parse_timestamp,
};
