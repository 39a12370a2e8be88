//! Hyperliquid WebSocket client.
//!
//! - Reconnection with exponential backoff and jitter
//! - Subscription replay after every reconnect, acks tracked per feed
//! - Application-level heartbeat (45s ping, 10s pong timeout)
//! - Channel messages forwarded on an mpsc channel

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;

pub use connection::{
    coin_subscriptions, ConnectionConfig, ConnectionManager, ConnectionState, SubscribeHandle,
    DEFAULT_WS_URL,
};
pub use error::{WsError, WsResult};
pub use message::{ChannelMessage, PongMessage, Subscription, WsMessage, WsRequest};
pub use subscription::SubscriptionManager;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the rustls crypto provider. Call before the first `wss://` connect.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
