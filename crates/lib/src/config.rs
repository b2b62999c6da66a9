//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (default `~/.teletrader/config.json`) and environment.
//! Secrets may live in the environment instead of the file; see the `resolve_*` functions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DERIV_ENDPOINT: &str = "wss://ws.binaryws.com/websockets/v3";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub deriv: DerivConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    /// Webhook server settings (only used when `telegram.webhookUrl` is set).
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub router: RouterConfig,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Usernames allowed to use the bot, with or without a leading `@`.
    #[serde(default)]
    pub allowed_usernames: Vec<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
    /// Seconds between "typing" chat actions while a reply is being prepared.
    #[serde(default = "default_typing_interval")]
    pub typing_interval_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_usernames: Vec::new(),
            webhook_url: None,
            webhook_secret: None,
            typing_interval_secs: default_typing_interval(),
        }
    }
}

fn default_typing_interval() -> u64 {
    4
}

/// Deriv brokerage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivConfig {
    /// Numeric application id. Overridden by DERIV_APP_ID env.
    pub app_id: Option<String>,
    /// API token used to authorize the session. Overridden by DERIV_API_TOKEN env.
    pub api_token: Option<String>,
    #[serde(default = "default_deriv_endpoint")]
    pub endpoint: String,
    /// Symbols listed by /symbols.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_duration_ticks")]
    pub contract_duration_ticks: u32,
}

impl Default for DerivConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            api_token: None,
            endpoint: default_deriv_endpoint(),
            symbols: default_symbols(),
            currency: default_currency(),
            contract_duration_ticks: default_duration_ticks(),
        }
    }
}

fn default_deriv_endpoint() -> String {
    DEFAULT_DERIV_ENDPOINT.to_string()
}

fn default_symbols() -> Vec<String> {
    ["R_10", "R_25", "R_50", "R_75", "R_100"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_duration_ticks() -> u32 {
    5
}

/// Which local LLM server answers free text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackendKind {
    #[default]
    Ollama,
    LmStudio,
}

impl<'de> Deserialize<'de> for LlmBackendKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        match s.trim().to_lowercase().as_str() {
            "" | "ollama" => Ok(LlmBackendKind::Ollama),
            "lmstudio" | "lm_studio" | "lm-studio" => Ok(LlmBackendKind::LmStudio),
            other => Err(serde::de::Error::custom(format!(
                "unknown llm backend {:?} (expected ollama or lmstudio)",
                other
            ))),
        }
    }
}

/// LLM backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: LlmBackendKind,
    /// Model name as the backend knows it (e.g. `llama3.2:latest` for Ollama).
    pub model: Option<String>,
    /// Backend base URL; each backend has its own local default.
    pub base_url: Option<String>,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15151
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// When set, trade buttons carry an HMAC tag bound to the chat. Overridden by TELETRADER_CALLBACK_SECRET env.
    pub callback_secret: Option<String>,
}

/// Env value, trimmed; empty counts as unset.
fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_override("TELEGRAM_BOT_TOKEN").or_else(|| trimmed(&config.telegram.bot_token))
}

/// Resolve the Deriv app id: env DERIV_APP_ID overrides config.
pub fn resolve_deriv_app_id(config: &Config) -> Option<String> {
    env_override("DERIV_APP_ID").or_else(|| trimmed(&config.deriv.app_id))
}

/// Resolve the Deriv API token: env DERIV_API_TOKEN overrides config.
pub fn resolve_deriv_api_token(config: &Config) -> Option<String> {
    env_override("DERIV_API_TOKEN").or_else(|| trimmed(&config.deriv.api_token))
}

/// Resolve the callback signing secret: env TELETRADER_CALLBACK_SECRET overrides config.
pub fn resolve_callback_secret(config: &Config) -> Option<String> {
    env_override("TELETRADER_CALLBACK_SECRET").or_else(|| trimmed(&config.router.callback_secret))
}

/// Credentials and settings the bot cannot start without, resolved from config and env.
#[derive(Debug, Clone)]
pub struct StartupSettings {
    pub bot_token: String,
    pub deriv_app_id: String,
    pub deriv_api_token: String,
    pub callback_secret: Option<String>,
}

/// Check that everything `start` needs is present. Errors name the missing setting.
pub fn validate(config: &Config) -> Result<StartupSettings> {
    let bot_token = resolve_telegram_token(config).context(
        "telegram bot token is not set (telegram.botToken or TELEGRAM_BOT_TOKEN)",
    )?;
    if !config
        .telegram
        .allowed_usernames
        .iter()
        .any(|u| !u.trim().trim_start_matches('@').is_empty())
    {
        anyhow::bail!("telegram.allowedUsernames must list at least one username");
    }
    let deriv_app_id = resolve_deriv_app_id(config)
        .context("deriv app id is not set (deriv.appId or DERIV_APP_ID)")?;
    if deriv_app_id.parse::<u64>().is_err() {
        anyhow::bail!("deriv app id must be numeric, got {:?}", deriv_app_id);
    }
    let deriv_api_token = resolve_deriv_api_token(config)
        .context("deriv api token is not set (deriv.apiToken or DERIV_API_TOKEN)")?;
    if config.deriv.contract_duration_ticks == 0 {
        anyhow::bail!("deriv.contractDurationTicks must be at least 1");
    }
    Ok(StartupSettings {
        bot_token,
        deriv_app_id,
        deriv_api_token,
        callback_secret: resolve_callback_secret(config),
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TELETRADER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".teletrader").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, TELETRADER_CONFIG_PATH, or the default. Missing file => default config.
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
