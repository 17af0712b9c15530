//! Application configuration for SecQ.
//!
//! User config lives at `~/.secq/secq.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SecqError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "secq.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".secq";

/// Number of knowledge base entries handed to the model per question.
pub const DEFAULT_MAX_CONTEXT_ENTRIES: usize = 5;

/// Minutes after which an unfinished generation run stops blocking new ones.
pub const DEFAULT_STALE_RUN_MINUTES: u64 = 120;

// ---------------------------------------------------------------------------
// Config structs (matching secq.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the SQLite database holding entries, questions and answers.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Maximum knowledge base entries selected as context per question.
    #[serde(default = "default_max_context_entries")]
    pub max_context_entries: usize,

    /// Minutes before a `running` run left by a killed process is abandoned.
    #[serde(default = "default_stale_run_minutes")]
    pub stale_run_minutes: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_context_entries: default_max_context_entries(),
            stale_run_minutes: default_stale_run_minutes(),
        }
    }
}

fn default_database_path() -> String {
    "~/.secq/secq.db".into()
}
fn default_max_context_entries() -> usize {
    DEFAULT_MAX_CONTEXT_ENTRIES
}

fn default_stale_run_minutes() -> u64 {
    DEFAULT_STALE_RUN_MINUTES
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for answer generation.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (the client appends `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on completion tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    800
}

impl OpenRouterConfig {
    /// Read the API key from the configured env var. Empty values count as missing.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.secq/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SecqError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.secq/secq.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SecqError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| SecqError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SecqError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| SecqError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SecqError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values the pipeline cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.openrouter.api_key_env.trim().is_empty() {
        return Err(SecqError::config("openrouter.api_key_env must not be empty"));
    }
    if config.defaults.stale_run_minutes == 0 {
        return Err(SecqError::config("defaults.stale_run_minutes must be positive"));
    }
    if config.openrouter.timeout_secs == 0 {
        return Err(SecqError::config("openrouter.timeout_secs must be positive"));
    }
    if !(0.0..=2.0).contains(&config.openrouter.temperature) {
        return Err(SecqError::config(format!(
            "openrouter.temperature must be within 0.0..=2.0, got {}",
            config.openrouter.temperature
        )));
    }
    Ok(())
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    match config.openrouter.api_key() {
        Some(_) => Ok(()),
        None => Err(SecqError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SecqError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_context_entries, 5);
        assert_eq!(parsed.defaults.stale_run_minutes, DEFAULT_STALE_RUN_MINUTES);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(parsed.openrouter.timeout_secs, 60);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
max_context_entries = 3

[openrouter]
default_model = "anthropic/claude-3.5-haiku"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.max_context_entries, 3);
        assert_eq!(config.defaults.database_path, "~/.secq/secq.db");
        assert_eq!(config.openrouter.default_model, "anthropic/claude-3.5-haiku");
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn load_config_rejects_bad_temperature() {
        let path = std::env::temp_dir().join(format!("secq_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[openrouter]\ntemperature = 7.5\n").unwrap();
        let result = load_config_from(&path);
        assert!(result.unwrap_err().to_string().contains("temperature"));
    }

    #[test]
    fn zero_stale_run_minutes_is_rejected() {
        let mut config = AppConfig::default();
        config.defaults.stale_run_minutes = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("stale_run_minutes"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "SECQ_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
        let expanded = expand_home("~/secq.db").unwrap();
        assert!(expanded.ends_with("secq.db"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
