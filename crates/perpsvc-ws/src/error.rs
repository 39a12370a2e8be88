//! Upstream feed errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Gave up after {0} reconnection attempts")]
    ReconnectExhausted(u32),

    #[error("Subscription send failed: {0}")]
    SendFailed(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Request encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WsError {
    /// Label recorded on the reconnect counter.
    pub fn reconnect_reason(&self) -> &'static str {
        match self {
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ConnectionClosed { .. } => "server_close",
            Self::Transport(_) => "transport",
            _ => "error",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
