//! WebSocket connection manager.
//!
//! Owns the upstream socket: connects, replays subscriptions, keeps the
//! link alive with application pings and reconnects with exponential
//! backoff until shut down.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{Subscription, WsMessage, WsRequest};
use crate::subscription::SubscriptionManager;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use perpsvc_telemetry::Metrics;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    /// 0 = retry forever.
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Upper bound of the random delay added to each backoff.
    pub reconnect_jitter_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Pause after the handshake before subscribing.
    pub subscribe_delay_ms: u64,
    /// Time spent draining responses between subscribe requests.
    pub subscribe_spacing_ms: u64,
    /// Coins tracked from startup.
    pub coins: Vec<String>,
    /// Candle intervals subscribed per coin.
    pub candle_intervals: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
            reconnect_jitter_ms: 1000,
            heartbeat_interval_ms: 45_000,
            heartbeat_timeout_ms: 10_000,
            subscribe_delay_ms: 1000,
            subscribe_spacing_ms: 100,
            coins: vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()],
            candle_intervals: vec!["1m".to_string()],
        }
    }
}

impl ConnectionConfig {
    /// `allMids` plus book, candles and trades for every configured coin.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subs = vec![Subscription::AllMids];
        for coin in &self.coins {
            subs.extend(coin_subscriptions(coin, &self.candle_intervals));
        }
        subs
    }
}

/// Feeds for one coin.
pub fn coin_subscriptions(coin: &str, intervals: &[String]) -> Vec<Subscription> {
    let mut subs = vec![Subscription::l2_book(coin)];
    subs.extend(intervals.iter().map(|i| Subscription::candle(coin, i.as_str())));
    subs.push(Subscription::trades(coin));
    subs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Cloneable handle for adding subscriptions while the manager runs.
#[derive(Clone)]
pub struct SubscribeHandle {
    subscriptions: Arc<SubscriptionManager>,
    outbound_tx: mpsc::Sender<Subscription>,
}

impl SubscribeHandle {
    /// Adds the subscription to the replay set and sends it if connected.
    /// Already-wanted subscriptions are a no-op.
    pub async fn subscribe(&self, sub: Subscription) -> WsResult<()> {
        if !self.subscriptions.add(sub.clone()) {
            return Ok(());
        }
        self.outbound_tx
            .send(sub)
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Sync variant for callers outside an async context. A full queue
    /// fails the send but keeps the subscription for the next reconnect.
    pub fn request(&self, sub: Subscription) -> WsResult<()> {
        if !self.subscriptions.add(sub.clone()) {
            return Ok(());
        }
        self.outbound_tx
            .try_send(sub)
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    pub fn is_subscribed(&self, sub: &Subscription) -> bool {
        self.subscriptions.wanted().contains(sub)
    }
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    subscriptions: Arc<SubscriptionManager>,
    heartbeat: Arc<HeartbeatManager>,
    message_tx: mpsc::Sender<WsMessage>,
    reconnect_count: Arc<RwLock<u32>>,
    outbound_tx: mpsc::Sender<Subscription>,
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<Subscription>>>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, message_tx: mpsc::Sender<WsMessage>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        Self {
            subscriptions: Arc::new(SubscriptionManager::new(config.subscriptions())),
            heartbeat: Arc::new(HeartbeatManager::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            )),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            message_tx,
            reconnect_count: Arc::new(RwLock::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn subscribe_handle(&self) -> SubscribeHandle {
        SubscribeHandle {
            subscriptions: self.subscriptions.clone(),
            outbound_tx: self.outbound_tx.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Connected and every subscription acknowledged.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected && self.subscriptions.is_ready()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Stops the message loop and any pending backoff.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        Metrics::ws_state_set(state.label());
        if state == ConnectionState::Connected {
            Metrics::ws_connected();
        } else {
            Metrics::ws_disconnected();
        }
    }

    /// Runs until shutdown or until `max_reconnect_attempts` is exhausted.
    pub async fn connect(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("WebSocket connection closed");
                    "closed"
                }
                Err(e) => {
                    error!(error = %e, "WebSocket connection error");
                    e.reconnect_reason()
                }
            };

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0 && attempt >= self.config.max_reconnect_attempts {
                error!(attempt, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ReconnectExhausted(attempt));
            }

            self.set_state(ConnectionState::Reconnecting);
            Metrics::ws_reconnect(reason);

            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, reason, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }

            self.subscriptions.reset();
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Connected);
        info!("WebSocket connected");

        // Queued subscriptions are already in the replay set.
        {
            let mut rx = self.outbound_rx.lock().await;
            while rx.try_recv().is_ok() {}
        }

        self.heartbeat.reset();
        self.restore_subscriptions(&mut write, &mut read).await?;

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text_message(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => self.heartbeat.record_pong(),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv => {
                    if let Some(sub) = outbound {
                        info!(subscription = %sub, "Subscribing");
                        send_request(&mut write, &WsRequest::subscribe(sub)).await?;
                    }
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_heartbeat() {
                        send_request(&mut write, &WsRequest::ping()).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    /// Unparseable frames are logged and skipped.
    async fn handle_text_message(&self, text: &str) {
        self.heartbeat.record_message();

        let msg: WsMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable WebSocket frame");
                return;
            }
        };

        match &msg {
            WsMessage::Pong(pong) => {
                if pong.is_pong() {
                    self.heartbeat.record_pong();
                }
                return;
            }
            WsMessage::Channel(channel_msg) => match channel_msg.channel.as_str() {
                "subscriptionResponse" => {
                    if let Some(key) = Subscription::key_from_ack(&channel_msg.data) {
                        self.subscriptions.mark_acked(key);
                    }
                    return;
                }
                "error" => {
                    warn!(data = %channel_msg.data, "Received error channel message");
                }
                channel => self.subscriptions.record_message(channel),
            },
        }

        if self.message_tx.send(msg).await.is_err() {
            warn!("Message receiver dropped");
        }
    }

    async fn restore_subscriptions(&self, write: &mut WsSink, read: &mut WsSource) -> WsResult<()> {
        let subs = self.subscriptions.wanted();
        info!(count = subs.len(), "Restoring subscriptions");

        if self.config.subscribe_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.subscribe_delay_ms)).await;
        }

        for (sent, sub) in subs.iter().enumerate() {
            send_request(write, &WsRequest::subscribe(sub.clone())).await?;
            self.drain_and_wait(write, read, self.config.subscribe_spacing_ms).await?;
            if (sent + 1) % 10 == 0 {
                info!(progress = format!("{}/{}", sent + 1, subs.len()), "Subscription progress");
            }
        }

        info!(total = subs.len(), "All subscriptions sent");
        Ok(())
    }

    /// Reads responses between subscribe requests so the socket buffer never backs up.
    async fn drain_and_wait(&self, write: &mut WsSink, read: &mut WsSource, wait_ms: u64) -> WsResult<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => return Ok(()),
                () = self.shutdown_token.cancelled() => return Ok(()),
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text_message(&text).await,
                        Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Close during subscription".to_string()));
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended during subscription".to_string(),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// `base * 2^(attempt-1)`, capped, plus jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = backoff_base_ms(
            attempt,
            self.config.reconnect_base_delay_ms,
            self.config.reconnect_max_delay_ms,
        );
        let jitter = if self.config.reconnect_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.reconnect_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(delay + jitter)
    }
}

fn backoff_base_ms(attempt: u32, base: u64, max: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u64 << exponent).min(max)
}

async fn send_request(write: &mut WsSink, request: &WsRequest) -> WsResult<()> {
    let text = serde_json::to_string(request)?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.heartbeat_interval_ms, 45_000);
        assert_eq!(config.heartbeat_timeout_ms, 10_000);
        assert_eq!(config.url, DEFAULT_WS_URL);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_base_ms(1, 1000, 60_000), 1000);
        assert_eq!(backoff_base_ms(2, 1000, 60_000), 2000);
        assert_eq!(backoff_base_ms(4, 1000, 60_000), 8000);
        assert_eq!(backoff_base_ms(7, 1000, 60_000), 60_000);
        assert_eq!(backoff_base_ms(40, 1000, 60_000), 60_000);
    }

    #[test]
    fn test_subscriptions_per_coin() {
        let config = ConnectionConfig {
            coins: vec!["BTC".to_string()],
            candle_intervals: vec!["1m".to_string(), "1h".to_string()],
            ..Default::default()
        };
        let keys: Vec<String> = config.subscriptions().iter().map(Subscription::key).collect();
        assert_eq!(
            keys,
            vec!["allMids", "l2Book:BTC", "candle:BTC:1m", "candle:BTC:1h", "trades:BTC"]
        );
    }

    #[test]
    fn test_jitter_bounded() {
        let (tx, _rx) = mpsc::channel(1);
        let manager = ConnectionManager::new(
            ConnectionConfig {
                reconnect_jitter_ms: 50,
                ..Default::default()
            },
            tx,
        );
        for _ in 0..20 {
            let delay = manager.backoff_delay(1).as_millis() as u64;
            assert!((1000..=1050).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_subscribe_handle_dedupes() {
        let (tx, _rx) = mpsc::channel(1);
        let manager = ConnectionManager::new(ConnectionConfig::default(), tx);
        let handle = manager.subscribe_handle();
        let sub = Subscription::l2_book("DOGE");
        assert!(!handle.is_subscribed(&sub));
        handle.subscribe(sub.clone()).await.unwrap();
        handle.subscribe(sub.clone()).await.unwrap();
        assert!(handle.is_subscribed(&sub));
        assert_eq!(
            manager.subscriptions().wanted().iter().filter(|s| **s == sub).count(),
            1
        );
    }

    #[test]
    fn test_request_queues_once() {
        let (tx, _rx) = mpsc::channel(1);
        let manager = ConnectionManager::new(ConnectionConfig::default(), tx);
        let handle = manager.subscribe_handle();
        let sub = Subscription::candle("DOGE", "5m");
        handle.request(sub.clone()).unwrap();
        handle.request(sub.clone()).unwrap();
        assert!(handle.is_subscribed(&sub));
    }
}
