//! Configuration loading, validation, and management for ragrelay.
//!
//! Loads configuration from `~/.ragrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragrelay/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default chat model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used for `/completions`
    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Model used to embed documents and questions
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Provider serving embeddings; `default_provider` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per chat response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bearer-token authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Chat turn behaviour
    #[serde(default)]
    pub chat: ChatConfig,

    /// Prompt preset
    #[serde(default)]
    pub preset: PresetConfig,

    /// Optional external preset file; replaces `[preset]` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_file: Option<PathBuf>,

    /// Storage backends
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_completion_model() -> String {
    "gpt-3.5-turbo-instruct".into()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("completion_model", &self.completion_model)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_provider", &self.embedding_provider)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("gateway", &self.gateway)
            .field("auth", &self.auth)
            .field("chat", &self.chat)
            .field("preset", &self.preset)
            .field("preset_file", &self.preset_file)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub allow_public_bind: bool,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_port() -> u16 {
    5001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allow_public_bind: false,
            cors_origins: Vec::new(),
            body_limit_bytes: default_body_limit(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// `host:port` for binding.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Sliding-window limit on the chat and completion routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> usize {
    20
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

/// Static bearer tokens, each bound to a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Reject `/api` requests without a known token
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub uid: String,
    #[serde(default)]
    pub name: String,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("token", &"[REDACTED]")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .finish()
    }
}

/// When the knowledge base is consulted for prompt context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Retrieve on every turn
    Always,
    /// Retrieve only when no tools are registered
    #[default]
    Auto,
    /// Never retrieve
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Character budget for history included in a prompt
    #[serde(default = "default_history_budget")]
    pub history_budget: usize,

    /// Maximum stored items per conversation
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Idle expiry of a conversation, in seconds
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: u64,

    #[serde(default)]
    pub retrieval: RetrievalMode,

    #[serde(default = "default_match_limit")]
    pub match_limit: usize,

    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Append the current date to the system prompt
    #[serde(default)]
    pub date_in_context: bool,

    /// Write every answered question to the chat log
    #[serde(default)]
    pub chat_log: bool,

    /// Prefix of the per-caller tag sent to the provider
    #[serde(default = "default_user_tag_prefix")]
    pub user_tag_prefix: String,

    /// Upper bound for one turn, including the tool round
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
}

fn default_history_budget() -> usize {
    3000
}
fn default_history_cap() -> usize {
    25
}
fn default_history_ttl() -> u64 {
    86_400
}
fn default_match_limit() -> usize {
    5
}
fn default_match_threshold() -> f32 {
    0.16
}
fn default_user_tag_prefix() -> String {
    "ragrelay-uid-".into()
}
fn default_turn_timeout() -> u64 {
    180
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_budget: default_history_budget(),
            history_cap: default_history_cap(),
            history_ttl_secs: default_history_ttl(),
            retrieval: RetrievalMode::default(),
            match_limit: default_match_limit(),
            match_threshold: default_match_threshold(),
            date_in_context: false,
            chat_log: false,
            user_tag_prefix: default_user_tag_prefix(),
            turn_timeout_secs: default_turn_timeout(),
        }
    }
}

/// Prompt preset: instructions and per-deployment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_header: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_model: Option<String>,

    /// Overrides `default_model` for chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl PresetConfig {
    /// Parse a standalone preset TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatLogBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub conversations: ConversationBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    /// JSONL file the knowledge base is loaded from and flushed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_file: Option<PathBuf>,

    #[serde(default)]
    pub chat_log_backend: ChatLogBackend,

    #[serde(default = "default_chat_log_path")]
    pub chat_log_path: PathBuf,
}

fn default_chat_log_path() -> PathBuf {
    AppConfig::config_dir().join("chatlog.jsonl")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversations: ConversationBackend::default(),
            redis_url: None,
            documents_file: None,
            chat_log_backend: ChatLogBackend::default(),
            chat_log_path: default_chat_log_path(),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("conversations", &self.conversations)
            .field("redis_url", &redact(&self.redis_url))
            .field("documents_file", &self.documents_file)
            .field("chat_log_backend", &self.chat_log_backend)
            .field("chat_log_path", &self.chat_log_path)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ragrelay/config.toml).
    ///
    /// Environment overrides:
    /// - `RAGRELAY_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `RAGRELAY_MODEL`
    /// - `RAGRELAY_LISTEN` (`host:port`)
    /// - `RAGRELAY_REDIS_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("RAGRELAY_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("RAGRELAY_MODEL") {
            self.default_model = model;
        }

        if let Some(listen) = lookup("RAGRELAY_LISTEN") {
            let (host, port) = listen.rsplit_once(':').ok_or_else(|| {
                ConfigError::ValidationError(format!("RAGRELAY_LISTEN must be host:port, got {listen}"))
            })?;
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("invalid port in RAGRELAY_LISTEN: {port}"))
            })?;
            if !host.is_empty() {
                self.gateway.host = host.to_string();
            }
        }

        if let Some(url) = lookup("RAGRELAY_REDIS_URL") {
            self.storage.redis_url = Some(url);
            self.storage.conversations = ConversationBackend::Redis;
        }

        self.validate()
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

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(preset_path) = &config.preset_file {
            let resolved = match path.parent() {
                Some(dir) if preset_path.is_relative() => dir.join(preset_path),
                _ => preset_path.clone(),
            };
            config.preset = PresetConfig::load_from(&resolved)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.chat.history_cap == 0 {
            return Err(ConfigError::ValidationError(
                "chat.history_cap must be at least 1".into(),
            ));
        }

        if self.chat.match_limit == 0 {
            return Err(ConfigError::ValidationError(
                "chat.match_limit must be at least 1".into(),
            ));
        }

        if self.storage.conversations == ConversationBackend::Redis
            && self.storage.redis_url.is_none()
        {
            return Err(ConfigError::ValidationError(
                "storage.redis_url is required for the redis conversation backend".into(),
            ));
        }

        if self.auth.required && self.auth.tokens.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.required is set but no auth.tokens are configured".into(),
            ));
        }

        if let Some(name) = &self.embedding_provider
            && *name != self.default_provider
            && !self.providers.contains_key(name)
        {
            return Err(ConfigError::ValidationError(format!(
                "embedding_provider '{name}' has no [providers.{name}] section"
            )));
        }

        if self.gateway.host == "0.0.0.0" && !self.gateway.allow_public_bind {
            return Err(ConfigError::ValidationError(
                "gateway bound to 0.0.0.0 without allow_public_bind = true".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Name of the provider that embeds documents and questions.
    pub fn embedding_provider(&self) -> &str {
        self.embedding_provider
            .as_deref()
            .unwrap_or(&self.default_provider)
    }

    /// The chat model after preset overrides.
    pub fn chat_model(&self) -> &str {
        self.preset.model.as_deref().unwrap_or(&self.default_model)
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
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            completion_model: default_completion_model(),
            embedding_model: default_embedding_model(),
            embedding_provider: None,
            default_temperature: default_temperature(),
            default_max_tokens: None,
            providers: HashMap::new(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            chat: ChatConfig::default(),
            preset: PresetConfig::default(),
            preset_file: None,
            storage: StorageConfig::default(),
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
