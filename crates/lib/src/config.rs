//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ragbridge/config.json`) and environment.
//! Secrets are usually supplied through the environment; the file is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (LINE).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Retrieval service settings.
    #[serde(default)]
    pub retriever: RetrieverConfig,

    /// Completion API settings (OpenRouter or any OpenAI-compatible endpoint).
    #[serde(default)]
    pub completion: CompletionConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook HTTP server (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: LineChannelConfig,
}

/// LINE Messaging API channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChannelConfig {
    /// Channel secret used to verify `x-line-signature`. Overridden by LINE_CHANNEL_SECRET env.
    pub channel_secret: Option<String>,
    /// Long-lived channel access token for the reply API. Overridden by LINE_CHANNEL_ACCESS_TOKEN env.
    pub channel_access_token: Option<String>,
    /// Messaging API base URL (default https://api.line.me).
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
    /// Reply call timeout in milliseconds.
    #[serde(default = "default_reply_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_reply_timeout_ms() -> u64 {
    10_000
}

impl Default for LineChannelConfig {
    fn default() -> Self {
        Self {
            channel_secret: None,
            channel_access_token: None,
            api_base: default_line_api_base(),
            timeout_ms: default_reply_timeout_ms(),
        }
    }
}

/// Retrieval service config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieverConfig {
    /// Base URL of the retriever; `/query` is appended. Overridden by RETRIEVER_ENDPOINT env.
    pub endpoint: Option<String>,
    /// Number of contexts requested per query.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Query timeout in milliseconds.
    #[serde(default = "default_retriever_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_top_k() -> u32 {
    3
}

fn default_retriever_timeout_ms() -> u64 {
    10_000
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            top_k: default_top_k(),
            timeout_ms: default_retriever_timeout_ms(),
        }
    }
}

/// Completion API config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Bearer key for the completion API. Overridden by OPENROUTER_API_KEY env.
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL; `/chat/completions` is appended.
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Completion timeout in milliseconds.
    #[serde(default = "default_completion_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    800
}

fn default_completion_timeout_ms() -> u64 {
    60_000
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_completion_timeout_ms(),
        }
    }
}

/// Non-empty trimmed value of an env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_value(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the LINE channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    env_value("LINE_CHANNEL_SECRET")
        .or_else(|| config_value(config.channels.line.channel_secret.as_ref()))
}

/// Resolve the LINE channel access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_channel_access_token(config: &Config) -> Option<String> {
    env_value("LINE_CHANNEL_ACCESS_TOKEN")
        .or_else(|| config_value(config.channels.line.channel_access_token.as_ref()))
}

/// Resolve the completion API key: env OPENROUTER_API_KEY overrides config.
pub fn resolve_completion_api_key(config: &Config) -> Option<String> {
    env_value("OPENROUTER_API_KEY").or_else(|| config_value(config.completion.api_key.as_ref()))
}

/// Resolve the retriever base URL: env RETRIEVER_ENDPOINT overrides config.
pub fn resolve_retriever_endpoint(config: &Config) -> Option<String> {
    env_value("RETRIEVER_ENDPOINT").or_else(|| config_value(config.retriever.endpoint.as_ref()))
}

/// Secrets and endpoints after env overrides. Built once at startup and handed to the gateway.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub channel_secret: Option<String>,
    pub channel_access_token: Option<String>,
    pub completion_api_key: Option<String>,
    pub retriever_endpoint: Option<String>,
}

impl Secrets {
    /// Resolve every value from env, falling back to the config file.
    pub fn resolve(config: &Config) -> Self {
        Self {
            channel_secret: resolve_channel_secret(config),
            channel_access_token: resolve_channel_access_token(config),
            completion_api_key: resolve_completion_api_key(config),
            retriever_endpoint: resolve_retriever_endpoint(config),
        }
    }

    /// Env names of values that resolved to nothing. The gateway still starts;
    /// calls depending on a missing value fail and fall back at runtime.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("LINE_CHANNEL_SECRET", &self.channel_secret),
            ("LINE_CHANNEL_ACCESS_TOKEN", &self.channel_access_token),
            ("OPENROUTER_API_KEY", &self.completion_api_key),
            ("RETRIEVER_ENDPOINT", &self.retriever_endpoint),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RAGBRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".ragbridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, the default path, or RAGBRIDGE_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
