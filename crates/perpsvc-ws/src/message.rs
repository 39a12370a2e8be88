//! WebSocket message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Market-data feeds the backend consumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Subscription {
    AllMids,
    L2Book { coin: String },
    Candle { coin: String, interval: String },
    Trades { coin: String },
}

impl Subscription {
    pub fn l2_book(coin: impl Into<String>) -> Self {
        Self::L2Book { coin: coin.into() }
    }

    pub fn candle(coin: impl Into<String>, interval: impl Into<String>) -> Self {
        Self::Candle {
            coin: coin.into(),
            interval: interval.into(),
        }
    }

    pub fn trades(coin: impl Into<String>) -> Self {
        Self::Trades { coin: coin.into() }
    }

    /// Stable key used to match acks ("l2Book:BTC", "candle:BTC:1m").
    pub fn key(&self) -> String {
        match self {
            Self::AllMids => "allMids".to_string(),
            Self::L2Book { coin } => format!("l2Book:{coin}"),
            Self::Candle { coin, interval } => format!("candle:{coin}:{interval}"),
            Self::Trades { coin } => format!("trades:{coin}"),
        }
    }

    /// Key of the subscription echoed in a `subscriptionResponse`.
    pub fn key_from_ack(data: &Value) -> Option<String> {
        let sub = data.get("subscription")?;
        serde_json::from_value::<Subscription>(sub.clone())
            .ok()
            .map(|s| s.key())
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Channel-based message; every upstream frame except pong has `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub data: Value,
}

/// `{"channel":"pong"}`. `deny_unknown_fields` keeps it from swallowing channel messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PongMessage {
    pub channel: String,
}

impl PongMessage {
    pub fn is_pong(&self) -> bool {
        self.channel == "pong"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    Pong(PongMessage),
    Channel(ChannelMessage),
}

impl WsMessage {
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Pong(p) if p.is_pong())
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::Pong(p) => &p.channel,
            Self::Channel(c) => &c.channel,
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

impl WsRequest {
    pub fn ping() -> Self {
        Self {
            method: "ping".to_string(),
            subscription: None,
        }
    }

    pub fn subscribe(subscription: Subscription) -> Self {
        Self {
            method: "subscribe".to_string(),
            subscription: Some(subscription),
        }
    }

    pub fn unsubscribe(subscription: Subscription) -> Self {
        Self {
            method: "unsubscribe".to_string(),
            subscription: Some(subscription),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_wire_format() {
        let req = WsRequest::subscribe(Subscription::candle("BTC", "1m"));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"method": "subscribe", "subscription": {"type": "candle", "coin": "BTC", "interval": "1m"}})
        );
        let req = WsRequest::subscribe(Subscription::AllMids);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"method": "subscribe", "subscription": {"type": "allMids"}})
        );
        assert_eq!(
            serde_json::to_string(&WsRequest::ping()).unwrap(),
            r#"{"method":"ping"}"#
        );
    }

    #[test]
    fn test_pong_vs_channel() {
        let pong: WsMessage = serde_json::from_str(r#"{"channel":"pong"}"#).unwrap();
        assert!(pong.is_pong());

        let mids: WsMessage =
            serde_json::from_str(r#"{"channel":"allMids","data":{"mids":{"BTC":"97000.5"}}}"#).unwrap();
        assert!(!mids.is_pong());
        assert_eq!(mids.channel(), "allMids");
    }

    #[test]
    fn test_ack_key() {
        let data = json!({"method": "subscribe", "subscription": {"type": "l2Book", "coin": "ETH"}});
        assert_eq!(Subscription::key_from_ack(&data).as_deref(), Some("l2Book:ETH"));

        let data = json!({"method": "subscribe", "subscription": {"type": "candle", "coin": "SOL", "interval": "4h"}});
        assert_eq!(Subscription::key_from_ack(&data).as_deref(), Some("candle:SOL:4h"));

        assert_eq!(Subscription::key_from_ack(&json!({"method": "subscribe"})), None);
    }
}
