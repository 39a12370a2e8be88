//! HTTP server configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Add `Secure` to session and nonce cookies.
    #[serde(default)]
    pub secure_cookies: bool,
    /// Maximum concurrent market stream connections.
    #[serde(default = "default_max_stream_connections")]
    pub max_stream_connections: usize,
    /// Positions calls allowed per user per window.
    #[serde(default = "default_positions_limit")]
    pub positions_limit: u32,
    #[serde(default = "default_positions_window_secs")]
    pub positions_window_secs: u64,
    /// Built frontend to serve for page routes (unset = 404).
    #[serde(default)]
    pub static_dir: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_stream_connections() -> usize {
    64
}

fn default_positions_limit() -> u32 {
    20
}

fn default_positions_window_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            secure_cookies: false,
            max_stream_connections: default_max_stream_connections(),
            positions_limit: default_positions_limit(),
            positions_window_secs: default_positions_window_secs(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn positions_window(&self) -> Duration {
        Duration::from_secs(self.positions_window_secs)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Account and trading rules applied by handlers.
#[derive(Debug, Clone)]
pub struct Policy {
    /// When set, revealing the custodial secret requires this passcode.
    pub reveal_passcode: Option<String>,
    /// Drift subaccount used until one is stored for the user.
    pub drift_default_subaccount: u16,
    /// Minimum custodial SOL balance before a Drift order is attempted.
    pub drift_min_lamports: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            reveal_passcode: None,
            drift_default_subaccount: 1,
            drift_min_lamports: 50_000_000,
        }
    }
}
