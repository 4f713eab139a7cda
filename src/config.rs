//! Configuration management for Talaria
//!
//! This module handles loading, parsing, validating, and persisting
//! configuration from a YAML file with environment overrides. The loaded
//! `Config` is constructed once at startup and injected into the relay
//! and the web server; a changed config is applied through an explicit
//! reload, never by re-reading the file mid-operation.

use crate::error::{Result, TalariaError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Main configuration structure for Talaria
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,
    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Local web server settings
    #[serde(default)]
    pub web: WebConfig,
    /// System prompt settings
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Upstream chat-completions API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API credential; may also come from `TALARIA_API_KEY`
    #[serde(default)]
    pub key: String,

    /// Base URL of the chat-completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling parameter (0.0 to 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Requested maximum output tokens; clamped to the provider ceiling
    /// when the request is built
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,

    /// Deadline for the whole streaming request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_output_tokens() -> usize {
    64_000
}

fn default_request_timeout() -> u64 {
    600
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the windowing policy
    #[serde(default = "default_context_window")]
    pub window: usize,

    /// Maximum number of stored messages loaded per relay cycle
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_context_window() -> usize {
    128_000
}

fn default_max_history() -> usize {
    10_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: default_context_window(),
            max_history: default_max_history(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the response cache is consulted and written
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entry time-to-live in days; zero or negative means no expiry
    #[serde(default = "default_cache_ttl_days")]
    pub ttl_days: i64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_days() -> i64 {
    7
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_days: default_cache_ttl_days(),
        }
    }
}

/// Local web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Port the server binds on localhost
    #[serde(default = "default_web_port")]
    pub port: u16,

    /// Directory of front-end static files, served when it exists
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_web_port() -> u16 {
    5000
}

fn default_static_dir() -> String {
    "public".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            static_dir: default_static_dir(),
        }
    }
}

/// System prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Path to the system prompt file; a built-in default is used when
    /// the file is missing or empty
    #[serde(default = "default_prompt_path")]
    pub path: String,
}

fn default_prompt_path() -> String {
    "system-prompt.txt".to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            path: default_prompt_path(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment overrides
    ///
    /// Falls back to defaults when the file does not exist. Missing keys
    /// in an existing file are filled with their defaults during
    /// deserialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TalariaError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TalariaError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(key) = std::env::var("TALARIA_API_KEY") {
            if !key.is_empty() {
                self.api.key = key;
            }
        }

        if let Ok(base_url) = std::env::var("TALARIA_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(model) = std::env::var("TALARIA_MODEL") {
            self.api.model = model;
        }

        if let Ok(port) = std::env::var("TALARIA_WEB_PORT") {
            if let Ok(value) = port.parse() {
                self.web.port = value;
            } else {
                tracing::warn!("Invalid TALARIA_WEB_PORT: {}", port);
            }
        }
    }

    /// Persist the configuration back to the given file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &str) -> Result<()> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| TalariaError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TalariaError::Config(format!("Failed to create config dir: {}", e)))?;
            }
        }

        std::fs::write(path, contents)
            .map_err(|e| TalariaError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error when a setting is outside its supported range.
    pub fn validate(&self) -> Result<()> {
        if Url::parse(&self.api.base_url).is_err() {
            return Err(TalariaError::Config(format!(
                "api.base_url is not a valid URL: {}",
                self.api.base_url
            ))
            .into());
        }

        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(TalariaError::Config(format!(
                "api.temperature must be between 0.0 and 2.0, got {}",
                self.api.temperature
            ))
            .into());
        }

        if !(0.0..=1.0).contains(&self.api.top_p) {
            return Err(TalariaError::Config(format!(
                "api.top_p must be between 0.0 and 1.0, got {}",
                self.api.top_p
            ))
            .into());
        }

        if self.api.max_output_tokens == 0 {
            return Err(
                TalariaError::Config("api.max_output_tokens must be positive".to_string()).into(),
            );
        }

        if self.context.window == 0 {
            return Err(
                TalariaError::Config("context.window must be positive".to_string()).into(),
            );
        }

        if self.web.port < 1024 {
            return Err(TalariaError::Config(format!(
                "web.port must be 1024 or above, got {}",
                self.web.port
            ))
            .into());
        }

        Ok(())
    }

    /// Returns true when an API credential is configured
    pub fn has_credential(&self) -> bool {
        !self.api.key.trim().is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            context: ContextConfig::default(),
            cache: CacheConfig::default(),
            web: WebConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}
