//! Configuration management for the FAQ bot.
//!
//! The service reads an optional JSON file (default `~/.faqbot/config.json`,
//! overridable with `FAQBOT_CONFIG`) and then applies environment variables.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Credentials
//! - `CHANNEL_ACCESS_TOKEN` → line.channel_access_token
//! - `CHANNEL_SECRET` → line.channel_secret
//! - `OPENAI_API_KEY` → llm.api_key
//!
//! ## Endpoints
//! - `LINE_API_BASE` → line.api_base
//! - `OPENAI_BASE_URL` → llm.base_url
//! - `OPENAI_MODEL` → llm.model
//!
//! ## Service
//! - `FAQBOT_BIND_ADDRESS` → network.bind
//! - `FAQBOT_PORT` → network.port
//! - `FAQBOT_FAQ_PATH` → faq.path
//! - `FAQBOT_LOG_LEVEL` → observability.log_level
//! - `FAQBOT_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FAQBOT_CONFIG";

/// Instruction prepended to every completion request unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是 DentalCloud 的客服助理，請根據 FAQ 資料回覆用戶的問題，若資料不足請友善引導他們留下聯絡方式以安排醫師回覆。";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".faqbot"),
        |dirs| dirs.home_dir().join(".faqbot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default "127.0.0.1"; use "0.0.0.0" behind a tunnel or proxy.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

// ============================================================================
// LINE Configuration
// ============================================================================

/// LINE Messaging API credentials and endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Long-lived channel access token used for the reply API
    #[serde(default)]
    pub channel_access_token: Option<String>,

    /// Channel secret used to verify `X-Line-Signature`
    #[serde(default)]
    pub channel_secret: Option<String>,

    /// API base URL (overridable for tests and proxies)
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            api_base: default_line_api_base(),
        }
    }
}

fn default_line_api_base() -> String {
    "https://api.line.me".into()
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Chat-completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (without the `/v1/...` suffix)
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub max_tokens: Option<i64>,

    /// System instruction; an empty string sends no system message
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of completion calls in flight at once
    #[serde(default = "default_llm_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: None,
            max_tokens: None,
            system_prompt: default_system_prompt(),
            timeout_secs: default_llm_timeout_secs(),
            max_concurrency: default_llm_max_concurrency(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_llm_max_concurrency() -> usize {
    8
}

// ============================================================================
// FAQ / Session Configuration
// ============================================================================

/// FAQ table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqConfig {
    /// Path to the `[{question, answer}]` JSON file
    #[serde(default = "default_faq_path")]
    pub path: PathBuf,

    /// Consult the FAQ table before calling the completion provider
    #[serde(default = "default_true")]
    pub match_before_completion: bool,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            path: default_faq_path(),
            match_before_completion: true,
        }
    }
}

fn default_faq_path() -> PathBuf {
    PathBuf::from("faq_data.json")
}

fn default_true() -> bool {
    true
}

/// Per-user conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of most recent messages kept per user
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_max_history() -> usize {
    5
}

// ============================================================================
// Observability Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the FAQ bot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub line: LineConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub faq: FaqConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply process environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = Some(token);
        }
        if let Some(secret) = lookup("CHANNEL_SECRET") {
            self.line.channel_secret = Some(secret);
        }
        if let Some(base) = lookup("LINE_API_BASE") {
            self.line.api_base = base;
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(base) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = base;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }

        if let Some(bind) = lookup("FAQBOT_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("FAQBOT_PORT") {
            match port.parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid FAQBOT_PORT"),
            }
        }
        if let Some(path) = lookup("FAQBOT_FAQ_PATH") {
            self.faq.path = PathBuf::from(path);
        }

        if let Some(level) = lookup("FAQBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("FAQBOT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Names of credentials that are unset or empty.
    ///
    /// Missing credentials are not fatal: the failure surfaces when the
    /// credential is first used.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let unset = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        let mut missing = Vec::new();
        if unset(&self.line.channel_access_token) {
            missing.push("CHANNEL_ACCESS_TOKEN");
        }
        if unset(&self.line.channel_secret) {
            missing.push("CHANNEL_SECRET");
        }
        if unset(&self.llm.api_key) {
            missing.push("OPENAI_API_KEY");
        }
        missing
    }

    /// Socket address the HTTP server listens on.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .network
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.network.bind))?;
        Ok(SocketAddr::from((ip, self.network.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.bind, "127.0.0.1");
        assert_eq!(config.network.port, 5000);
        assert_eq!(config.line.api_base, "https://api.line.me");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.faq.path, PathBuf::from("faq_data.json"));
        assert!(config.faq.match_before_completion);
        assert_eq!(config.session.max_history, 5);
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "network": { "port": 8080 }, "faq": { "match_before_completion": false } }"#,
        )
        .unwrap();
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.network.bind, "127.0.0.1");
        assert!(!config.faq.match_before_completion);
        assert_eq!(config.faq.path, PathBuf::from("faq_data.json"));
        assert_eq!(config.llm.timeout_secs, 60);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("CHANNEL_ACCESS_TOKEN", "token"),
            ("CHANNEL_SECRET", "secret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("FAQBOT_PORT", "8000"),
            ("FAQBOT_FAQ_PATH", "/etc/faqbot/faq.json"),
        ]));

        assert_eq!(config.line.channel_access_token.as_deref(), Some("token"));
        assert_eq!(config.line.channel_secret.as_deref(), Some("secret"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.network.port, 8000);
        assert_eq!(config.faq.path, PathBuf::from("/etc/faqbot/faq.json"));
        assert!(config.missing_credentials().is_empty());
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[("FAQBOT_PORT", "not-a-port")]));
        assert_eq!(config.network.port, 5000);
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = Config::default();
        config.line.channel_secret = Some("  ".into());
        assert_eq!(
            config.missing_credentials(),
            vec!["CHANNEL_ACCESS_TOKEN", "CHANNEL_SECRET", "OPENAI_API_KEY"]
        );
    }

    #[test]
    fn test_listen_addr() {
        let mut config = Config::default();
        config.network.bind = "0.0.0.0".into();
        config.network.port = 9000;
        assert_eq!(config.listen_addr().unwrap().to_string(), "0.0.0.0:9000");

        config.network.bind = "localhost".into();
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "llm": {{ "system_prompt": "" }} }}"#).unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(config.llm.system_prompt.is_empty());
    }

    #[test]
    fn test_load_from_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
