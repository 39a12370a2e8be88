//! Application configuration.
//!
//! Loaded from TOML through the `config` crate, then overridden by
//! `PERPSVC__SECTION__KEY` environment variables. A handful of legacy
//! variable names are honoured as fallbacks for deployments that still set them.

use crate::error::{AppError, AppResult};
use perpsvc_ledger::client::DEFAULT_RPC_URL;
use perpsvc_ledger::helius::DEFAULT_HELIUS_URL;
use perpsvc_server::{Policy, ServerConfig};
use perpsvc_venue::drift::DEFAULT_GATEWAY_URL;
use perpsvc_venue::hyperliquid::DEFAULT_API_URL;
use perpsvc_venue::jupiter::DEFAULT_JUPITER_URL;
use perpsvc_ws::{ConnectionConfig, DEFAULT_WS_URL};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "PERPSVC";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Postgres connection. An empty URL runs on the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for session tokens; at least 32 bytes.
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Key-encryption key: base64 of 32 bytes, or a passphrase.
    #[serde(default)]
    pub kek: String,
    /// Passcode guarding secret reveal; unset allows GET reveal.
    #[serde(default)]
    pub reveal_passcode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperliquidConfig {
    #[serde(default = "default_hyperliquid_url")]
    pub api_url: String,
    #[serde(default = "default_true")]
    pub is_mainnet: bool,
}

fn default_hyperliquid_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for HyperliquidConfig {
    fn default() -> Self {
        Self {
            api_url: default_hyperliquid_url(),
            is_mainnet: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_subaccount")]
    pub default_subaccount: u16,
    /// Minimum SOL balance, in lamports, before a Drift order is attempted.
    #[serde(default = "default_min_lamports")]
    pub min_lamports: u64,
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_subaccount() -> u16 {
    1
}

fn default_min_lamports() -> u64 {
    50_000_000
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            default_subaccount: default_subaccount(),
            min_lamports: default_min_lamports(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterConfig {
    #[serde(default = "default_jupiter_url")]
    pub api_url: String,
}

fn default_jupiter_url() -> String {
    DEFAULT_JUPITER_URL.to_string()
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_url: default_jupiter_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeliusConfig {
    #[serde(default = "default_helius_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_helius_url() -> String {
    DEFAULT_HELIUS_URL.to_string()
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            api_url: default_helius_url(),
            api_key: None,
        }
    }
}

/// Coins and candle intervals fed into the market hub from startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_coins")]
    pub coins: Vec<String>,
    #[serde(default = "default_intervals")]
    pub candle_intervals: Vec<String>,
}

fn default_coins() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()]
}

fn default_intervals() -> Vec<String> {
    vec!["1m".to_string()]
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            coins: default_coins(),
            candle_intervals: default_intervals(),
        }
    }
}

/// Upstream WebSocket tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,
    /// 0 = retry forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_heartbeat_interval_ms() -> u64 {
    45_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub custody: CustodyConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub hyperliquid: HyperliquidConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub jupiter: JupiterConfig,
    #[serde(default)]
    pub helius: HeliusConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

impl AppConfig {
    /// Config path: CLI argument > `PERPSVC_CONFIG` > `config/default.toml`.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var("PERPSVC_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load the file (if present), apply environment overrides and legacy fallbacks.
    pub fn load(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path, "Config file not found, using defaults and environment");
        }
        let mut config: Self = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("market.coins")
                    .with_list_parse_key("market.candle_intervals")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_legacy_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill fields still at their defaults from the older variable names.
    pub fn apply_legacy_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if self.helius.api_key.is_none() {
            self.helius.api_key = var("HELIUS_API_KEY");
        }
        if self.custody.reveal_passcode.is_none() {
            self.custody.reveal_passcode = var("PRIVATE_KEY_VIEW_PASS");
        }
        if self.drift.default_subaccount == default_subaccount() {
            if let Some(sub) = var("DRIFT_SUBACCOUNT_ID").and_then(|v| v.parse().ok()) {
                self.drift.default_subaccount = sub;
            }
        }
        if self.drift.min_lamports == default_min_lamports() {
            if let Some(min) = var("DRIFT_MIN_LAMPORTS").and_then(|v| v.parse().ok()) {
                self.drift.min_lamports = min;
            }
        }
        if self.solana.rpc_url == DEFAULT_RPC_URL {
            if let Some(url) = var("NEXT_PUBLIC_SOLANA_RPC") {
                self.solana.rpc_url = url;
            }
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.session.secret.len() < perpsvc_auth::session::MIN_KEY_LEN {
            return Err(AppError::Config(format!(
                "session.secret must be at least {} bytes",
                perpsvc_auth::session::MIN_KEY_LEN
            )));
        }
        if self.custody.kek.trim().is_empty() {
            return Err(AppError::Config("custody.kek is required".to_string()));
        }
        if self.market.coins.is_empty() {
            return Err(AppError::Config("market.coins must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn policy(&self) -> Policy {
        Policy {
            reveal_passcode: self.custody.reveal_passcode.clone(),
            drift_default_subaccount: self.drift.default_subaccount,
            drift_min_lamports: self.drift.min_lamports,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.websocket.url.clone(),
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            heartbeat_interval_ms: self.websocket.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.websocket.heartbeat_timeout_ms,
            coins: self.market.coins.clone(),
            candle_intervals: self.market.candle_intervals.clone(),
            ..ConnectionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_file_parses() {
        let config: AppConfig = toml::from_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.drift.default_subaccount, 1);
        assert_eq!(config.market.coins, vec!["BTC", "ETH", "SOL"]);
        assert!(config.hyperliquid.is_mainnet);
    }

    #[test]
    fn test_partial_sections_take_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [drift]
            min_lamports = 10

            [websocket]
            heartbeat_interval_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(config.drift.min_lamports, 10);
        assert_eq!(config.drift.default_subaccount, 1);
        assert_eq!(config.websocket.heartbeat_interval_ms, 30_000);
        assert_eq!(config.websocket.heartbeat_timeout_ms, 10_000);
        assert_eq!(config.solana.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn test_legacy_env_fills_defaults_only() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HELIUS_API_KEY", "hk"),
            ("PRIVATE_KEY_VIEW_PASS", "pass1234"),
            ("DRIFT_SUBACCOUNT_ID", "3"),
            ("DRIFT_MIN_LAMPORTS", "not-a-number"),
            ("NEXT_PUBLIC_SOLANA_RPC", "https://rpc.example"),
        ]);
        let mut config = AppConfig::default();
        config.custody.reveal_passcode = Some("from-file".to_string());
        config.apply_legacy_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.helius.api_key.as_deref(), Some("hk"));
        assert_eq!(config.custody.reveal_passcode.as_deref(), Some("from-file"));
        assert_eq!(config.drift.default_subaccount, 3);
        assert_eq!(config.drift.min_lamports, 50_000_000);
        assert_eq!(config.solana.rpc_url, "https://rpc.example");
    }

    #[test]
    fn test_validate_requires_secrets() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());
        config.session.secret = "x".repeat(32);
        assert!(config.validate().is_err());
        config.custody.kek = "passphrase".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_config_uses_market_coins() {
        let mut config = AppConfig::default();
        config.market.coins = vec!["DOGE".to_string()];
        let ws = config.connection_config();
        assert_eq!(ws.coins, vec!["DOGE"]);
        assert_eq!(ws.heartbeat_interval_ms, 45_000);
        assert_eq!(ws.url, DEFAULT_WS_URL);
    }
}
