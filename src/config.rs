// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backoff::BackoffConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub stores: StoreConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// host:port of the gateway endpoint
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
    /// 0 = retry forever
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub moderators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_document_path")]
    pub document_path: String,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    #[serde(default = "default_health_check_secs")]
    pub health_check_secs: u64,
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_hello_timeout_secs() -> u64 {
    10
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    3
}

fn default_status_interval_secs() -> u64 {
    300
}

fn default_document_path() -> String {
    "./chirp.db".to_string()
}

fn default_cache_path() -> String {
    "./chirp-cache.db".to_string()
}

fn default_health_check_secs() -> u64 {
    30
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            handler_timeout_secs: default_handler_timeout_secs(),
            default_cooldown_secs: default_cooldown_secs(),
            statuses: Vec::new(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            cache_path: default_cache_path(),
            health_check_secs: default_health_check_secs(),
        }
    }
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Config {
                gateway: GatewayConfig {
                    address: String::new(),
                    token: None,
                    hello_timeout_secs: default_hello_timeout_secs(),
                    max_reconnect_attempts: 0,
                },
                bot: BotConfig::default(),
                permissions: PermissionsConfig::default(),
                stores: StoreConfig::default(),
                backoff: BackoffConfig::default(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("CHIRP_GATEWAY_ADDRESS") {
            config.gateway.address = val;
        }
        if let Ok(val) = std::env::var("CHIRP_GATEWAY_TOKEN") {
            config.gateway.token = Some(val);
        }
        if let Ok(val) = std::env::var("CHIRP_MAX_RECONNECT_ATTEMPTS") {
            config.gateway.max_reconnect_attempts = val.parse().with_context(|| {
                format!("CHIRP_MAX_RECONNECT_ATTEMPTS must be a number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("CHIRP_PREFIX") {
            config.bot.prefix = val;
        }
        if let Ok(val) = std::env::var("CHIRP_HANDLER_TIMEOUT_SECS") {
            config.bot.handler_timeout_secs = val.parse().with_context(|| {
                format!("CHIRP_HANDLER_TIMEOUT_SECS must be a number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("CHIRP_OWNERS") {
            config.permissions.owners = split_list(&val);
        }
        if let Ok(val) = std::env::var("CHIRP_ADMINS") {
            config.permissions.admins = split_list(&val);
        }
        if let Ok(val) = std::env::var("CHIRP_MODERATORS") {
            config.permissions.moderators = split_list(&val);
        }
        if let Ok(val) = std::env::var("CHIRP_DOCUMENT_PATH") {
            config.stores.document_path = val;
        }
        if let Ok(val) = std::env::var("CHIRP_CACHE_PATH") {
            config.stores.cache_path = val;
        }

        // Validate required fields
        if config.gateway.address.trim().is_empty() {
            anyhow::bail!(
                "gateway.address is required (set in config.toml or CHIRP_GATEWAY_ADDRESS env var)"
            );
        }
        let token_missing = config
            .gateway
            .token
            .as_deref()
            .map(|t| t.trim().is_empty())
            .unwrap_or(true);
        if token_missing {
            anyhow::bail!(
                "gateway.token is required (set in config.toml or CHIRP_GATEWAY_TOKEN env var)"
            );
        }
        if config.bot.prefix.is_empty() || config.bot.prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("bot.prefix must be non-empty and contain no whitespace");
        }
        if config.bot.handler_timeout_secs == 0 {
            anyhow::bail!("bot.handler_timeout_secs must be at least 1");
        }
        if config.backoff.factor < 1.0 {
            anyhow::bail!("backoff.factor must be >= 1.0");
        }
        if config.backoff.initial_ms == 0 || config.backoff.max_ms < config.backoff.initial_ms {
            anyhow::bail!("backoff.initial_ms must be > 0 and <= backoff.max_ms");
        }
        if config.stores.health_check_secs == 0 {
            anyhow::bail!("stores.health_check_secs must be at least 1");
        }

        Ok(config)
    }

    pub fn token(&self) -> &str {
        self.gateway.token.as_deref().unwrap_or("")
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
