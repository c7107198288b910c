//! Configuration loading, validation, and management for SalesDesk.
//!
//! Loads configuration from `~/.salesdesk/config.toml` with environment
//! variable overrides. Validates all settings at startup. Missing
//! credentials never fail loading: the model backend reports
//! `NotConfigured` on use and validation is simply disabled.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.salesdesk/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model backend
    #[serde(default)]
    pub model: ModelConfig,

    /// Response validation backend
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Mock CRM settings
    #[serde(default)]
    pub crm: CrmConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend flavour; only OpenAI-compatible endpoints are supported
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-call timeout for the model backend
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_model_timeout() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_model_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Master switch; validation also stays off without a key and project
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_guardrail_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Tag sent as `metadata.integration` with every validation request
    #[serde(default = "default_integration")]
    pub integration: String,

    #[serde(default = "default_guardrail_timeout")]
    pub timeout_secs: u64,
}

fn default_guardrail_url() -> String {
    "https://api.cleanlab.ai/api/v1".into()
}
fn default_integration() -> String {
    "salesdesk".into()
}
fn default_guardrail_timeout() -> u64 {
    15
}

impl GuardrailConfig {
    /// Whether enough is configured to call the backend.
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.is_some() && self.project_id.is_some()
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_url: default_guardrail_url(),
            project_id: None,
            integration: default_integration(),
            timeout_secs: default_guardrail_timeout(),
        }
    }
}

impl std::fmt::Debug for GuardrailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("project_id", &self.project_id)
            .field("integration", &self.integration)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum model calls that may request tools in one turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Per-handler timeout
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Replace the generated system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_steps() -> usize {
    5
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            tool_timeout_secs: default_tool_timeout(),
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    /// "Today" for relative periods; the system date when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<NaiveDate>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.salesdesk/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `SALESDESK_API_KEY`, then `OPENAI_API_KEY`
    /// - `SALESDESK_MODEL`, `SALESDESK_API_URL`
    /// - `SALESDESK_GUARDRAIL_API_KEY`, `SALESDESK_GUARDRAIL_PROJECT_ID`,
    ///   `SALESDESK_GUARDRAIL_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from an explicit path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
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

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SALESDESK_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup("SALESDESK_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("SALESDESK_API_URL") {
            self.model.api_url = url;
        }
        if let Some(key) = lookup("SALESDESK_GUARDRAIL_API_KEY") {
            self.guardrail.api_key = Some(key);
        }
        if let Some(project) = lookup("SALESDESK_GUARDRAIL_PROJECT_ID") {
            self.guardrail.project_id = Some(project);
        }
        if let Some(url) = lookup("SALESDESK_GUARDRAIL_URL") {
            self.guardrail.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".salesdesk")
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.provider != "openai" {
            return Err(ConfigError::ValidationError(format!(
                "unsupported model.provider '{}' (expected \"openai\")",
                self.model.provider
            )));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }

        if self.model.timeout_secs == 0
            || self.guardrail.timeout_secs == 0
            || self.agent.tool_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
