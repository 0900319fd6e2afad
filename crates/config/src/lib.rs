//! Configuration loading, validation, and management for RelayMind.
//!
//! Loads configuration from `~/.relaymind/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use relaymind_core::inference::GenerationParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.relaymind/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite history file (defaults to `<config_dir>/chat_history.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Number of prior turns fed back to the model
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Prompt and reply wording
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Remote inference endpoint
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Telegram bot settings
    #[serde(default)]
    pub telegram: TelegramSettings,
}

fn default_history_limit() -> usize {
    relaymind_core::DEFAULT_HISTORY_LIMIT
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "None" } else { "[REDACTED]" }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_path", &self.database_path)
            .field("history_limit", &self.history_limit)
            .field("assistant", &self.assistant)
            .field("inference", &self.inference)
            .field("telegram", &self.telegram)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that remembers conversation history. \
Continue the conversation naturally.";
pub const DEFAULT_FALLBACK_REPLY: &str = "I'm having trouble responding right now.";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token; empty means anonymous requests
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_true")]
    pub do_sample: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on concurrent in-flight inference calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_base_url() -> String {
    "https://api-inference.huggingface.co/models".into()
}
fn default_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.2".into()
}
fn default_max_new_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    8
}

impl InferenceConfig {
    /// Sampling parameters for every request.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            do_sample: self.do_sample,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: String::new(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            do_sample: true,
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("max_new_tokens", &self.max_new_tokens)
            .field("temperature", &self.temperature)
            .field("do_sample", &self.do_sample)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Bot token from @BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Allowlist of user IDs. Empty or ["*"] = everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_users: vec![],
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.relaymind/config.toml).
    ///
    /// `RELAYMIND_CONFIG` points at an alternate file. Environment variables
    /// then override the file:
    /// - `TELEGRAM_BOT_TOKEN`
    /// - `HUGGINGFACE_API_KEY` (or `HF_API_KEY`)
    /// - `RELAYMIND_MODEL`
    /// - `RELAYMIND_DATABASE`
    ///
    /// A `.env` file in the working directory supplies any of these that the
    /// process environment does not set.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        let dotenv = Self::load_dotenv(Path::new(".env"))?;
        config.apply_env_overrides(|key| {
            std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
        });
        config.validate()?;
        Ok(config)
    }

    /// Read `KEY=value` pairs from a dotenv file without touching the process
    /// environment. A missing file yields no pairs.
    pub fn load_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
        let read_error = |e: dotenvy::Error| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let entries = match dotenvy::from_path_iter(path) {
            Ok(entries) => entries,
            Err(e) if e.not_found() => return Ok(HashMap::new()),
            Err(e) => return Err(read_error(e)),
        };

        let vars = entries
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(read_error)?;
        tracing::debug!(path = %path.display(), count = vars.len(), "Loaded dotenv file");
        Ok(vars)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Empty values are ignored so that an exported-but-blank variable does not
    /// wipe a token from the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(key) = get("HUGGINGFACE_API_KEY").or_else(|| get("HF_API_KEY")) {
            self.inference.api_key = key;
        }
        if let Some(model) = get("RELAYMIND_MODEL") {
            self.inference.model = model;
        }
        if let Some(path) = get("RELAYMIND_DATABASE") {
            self.database_path = Some(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".relaymind")
    }

    /// The config file `load` reads: `RELAYMIND_CONFIG` or `<config_dir>/config.toml`.
    pub fn config_path() -> PathBuf {
        std::env::var("RELAYMIND_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Resolved history database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(p) => expand_home(p),
            None => Self::config_dir().join("chat_history.db"),
        }
    }

    /// The bot token, or `MissingBotToken` if none is configured.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        let token = self.telegram.bot_token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        Ok(token)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.inference.temperature) {
            return Err(ConfigError::ValidationError(
                "inference.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.inference.max_new_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "inference.max_new_tokens must be > 0".into(),
            ));
        }
        if self.inference.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "inference.timeout_secs must be > 0".into(),
            ));
        }
        if self.inference.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "inference.max_concurrent must be > 0".into(),
            ));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "history_limit must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            history_limit: default_history_limit(),
            assistant: AssistantConfig::default(),
            inference: InferenceConfig::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None => PathBuf::from(path),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No Telegram bot token configured (set TELEGRAM_BOT_TOKEN or telegram.bot_token)")]
    MissingBotToken,
}
