//! Hyperliquid REST seam: `/info` queries and `/exchange` submissions.

use super::signing::ExchangeRequest;
use super::types::{ClearinghouseState, L2Book, WireCandle, WireTrade};
use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use perpsvc_core::{AssetSpec, BoxFuture};
use perpsvc_telemetry::Metrics;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.hyperliquid.xyz";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub trait HyperliquidApi: Send + Sync {
    /// Perp universe in wire order; the position is the asset id.
    fn perp_universe(&self) -> BoxFuture<'_, ClientResult<Vec<AssetSpec>>>;

    fn all_mids(&self) -> BoxFuture<'_, ClientResult<HashMap<String, f64>>>;

    fn l2_book<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, ClientResult<L2Book>>;

    fn candle_snapshot<'a>(
        &'a self,
        coin: &'a str,
        interval: &'a str,
        start_ms: i64,
        end_ms: i64,
    ) -> BoxFuture<'a, ClientResult<Vec<WireCandle>>>;

    fn recent_trades<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, ClientResult<Vec<WireTrade>>>;

    fn clearinghouse_state<'a>(&'a self, user: &'a str) -> BoxFuture<'a, ClientResult<ClearinghouseState>>;

    fn open_orders<'a>(&'a self, user: &'a str) -> BoxFuture<'a, ClientResult<Vec<Value>>>;

    /// Submit a signed action. `{"status":"err"}` responses become `Rejected`.
    fn exchange(&self, request: ExchangeRequest) -> BoxFuture<'_, ClientResult<Value>>;
}

pub type DynHyperliquidApi = Arc<dyn HyperliquidApi>;

#[derive(Debug, Deserialize)]
struct RawUniverse {
    universe: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAsset {
    name: String,
    sz_decimals: u32,
    #[serde(default)]
    max_leverage: Option<u32>,
}

/// Parse `metaAndAssetCtxs` (`[meta, ctxs]`) or a bare `meta` object.
pub fn parse_universe(body: &Value) -> ClientResult<Vec<AssetSpec>> {
    let meta = match body {
        Value::Array(parts) => parts
            .first()
            .ok_or_else(|| ClientError::Decode("empty metaAndAssetCtxs".to_string()))?,
        other => other,
    };
    let raw: RawUniverse = serde_json::from_value(meta.clone())?;
    Ok(raw
        .universe
        .into_iter()
        .enumerate()
        .map(|(index, a)| AssetSpec {
            index: index as u32,
            name: a.name,
            sz_decimals: a.sz_decimals,
            max_leverage: a.max_leverage.unwrap_or(1),
        })
        .collect())
}

/// Parse the `allMids` map, skipping entries that are not numbers.
pub fn parse_mids(body: &Value) -> HashMap<String, f64> {
    body.as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(coin, v)| {
                    let px = match v {
                        Value::String(s) => s.parse().ok(),
                        other => other.as_f64(),
                    }?;
                    Some((coin.clone(), px))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Map an `/exchange` response body onto a result.
///
/// The venue reports most order failures as `status: "ok"` with an
/// `error` entry in `response.data.statuses`; both shapes are rejections.
pub fn check_exchange_response(body: Value) -> ClientResult<Value> {
    if body.get("status").and_then(Value::as_str) == Some("err") {
        let msg = match body.get("response") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "exchange rejected the action".to_string(),
        };
        return Err(ClientError::Rejected(msg));
    }
    if let Some(msg) = first_status_error(&body) {
        return Err(ClientError::Rejected(msg));
    }
    Ok(body)
}

/// First per-order error inside `response.data.statuses`, if any.
pub fn first_status_error(body: &Value) -> Option<String> {
    body.pointer("/response/data/statuses")?
        .as_array()?
        .iter()
        .find_map(|s| s.get("error").and_then(Value::as_str).map(str::to_string))
}

/// HTTP client for the public API.
pub struct HyperliquidClient {
    client: Client,
    info_url: String,
    exchange_url: String,
}

impl HyperliquidClient {
    /// `base_url` without a trailing path, e.g. `https://api.hyperliquid.xyz`.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Http(format!("Failed to create HTTP client: {e}")))?;
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            info_url: format!("{base}/info"),
            exchange_url: format!("{base}/exchange"),
        })
    }

    async fn post(&self, url: &str, body: &Value, label: &str) -> ClientResult<Value> {
        let started = Instant::now();
        let response = self.client.post(url).json(body).send().await?;
        Metrics::upstream_latency("hyperliquid", started.elapsed().as_secs_f64() * 1000.0);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, request = label, "Hyperliquid request failed");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(request = label, "Hyperliquid response received");
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(format!("Failed to parse response: {e}")))
    }

    async fn info(&self, body: Value) -> ClientResult<Value> {
        let label = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("info")
            .to_string();
        self.post(&self.info_url, &body, &label).await
    }
}

impl HyperliquidApi for HyperliquidClient {
    fn perp_universe(&self) -> BoxFuture<'_, ClientResult<Vec<AssetSpec>>> {
        Box::pin(async move {
            let body = self.info(json!({"type": "metaAndAssetCtxs"})).await?;
            parse_universe(&body)
        })
    }

    fn all_mids(&self) -> BoxFuture<'_, ClientResult<HashMap<String, f64>>> {
        Box::pin(async move {
            let body = self.info(json!({"type": "allMids"})).await?;
            Ok(parse_mids(&body))
        })
    }

    fn l2_book<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, ClientResult<L2Book>> {
        Box::pin(async move {
            let body = self.info(json!({"type": "l2Book", "coin": coin})).await?;
            Ok(serde_json::from_value(body)?)
        })
    }

    fn candle_snapshot<'a>(
        &'a self,
        coin: &'a str,
        interval: &'a str,
        start_ms: i64,
        end_ms: i64,
    ) -> BoxFuture<'a, ClientResult<Vec<WireCandle>>> {
        Box::pin(async move {
            let body = self
                .info(json!({
                    "type": "candleSnapshot",
                    "req": {"coin": coin, "interval": interval, "startTime": start_ms, "endTime": end_ms}
                }))
                .await?;
            if body.is_null() {
                return Ok(Vec::new());
            }
            Ok(serde_json::from_value(body)?)
        })
    }

    fn recent_trades<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, ClientResult<Vec<WireTrade>>> {
        Box::pin(async move {
            let body = self.info(json!({"type": "recentTrades", "coin": coin})).await?;
            if body.is_null() {
                return Ok(Vec::new());
            }
            Ok(serde_json::from_value(body)?)
        })
    }

    fn clearinghouse_state<'a>(&'a self, user: &'a str) -> BoxFuture<'a, ClientResult<ClearinghouseState>> {
        Box::pin(async move {
            let body = self
                .info(json!({"type": "clearinghouseState", "user": user}))
                .await?;
            Ok(serde_json::from_value(body)?)
        })
    }

    fn open_orders<'a>(&'a self, user: &'a str) -> BoxFuture<'a, ClientResult<Vec<Value>>> {
        Box::pin(async move {
            let body = self.info(json!({"type": "openOrders", "user": user})).await?;
            Ok(match body {
                Value::Array(orders) => orders,
                _ => Vec::new(),
            })
        })
    }

    fn exchange(&self, request: ExchangeRequest) -> BoxFuture<'_, ClientResult<Value>> {
        Box::pin(async move {
            let body = serde_json::to_value(&request)?;
            let response = self.post(&self.exchange_url, &body, "exchange").await?;
            check_exchange_response(response)
        })
    }
}

/// In-memory venue for tests and offline runs.
#[derive(Default)]
pub struct FakeHyperliquid {
    universe: Mutex<Vec<AssetSpec>>,
    mids: Mutex<HashMap<String, f64>>,
    books: Mutex<HashMap<String, L2Book>>,
    candles: Mutex<Vec<WireCandle>>,
    trades: Mutex<Vec<WireTrade>>,
    state: Mutex<Option<ClearinghouseState>>,
    state_error: Mutex<Option<u16>>,
    orders: Mutex<Vec<Value>>,
    /// Rejection message per action type ("order", "updateLeverage", ...).
    reject: Mutex<HashMap<String, String>>,
    /// Reject every submission after the first N with this message.
    reject_after: Mutex<Option<(usize, String)>>,
    submitted: Mutex<Vec<ExchangeRequest>>,
    candle_calls: Mutex<Vec<(i64, i64)>>,
    candle_error: Mutex<bool>,
}

impl FakeHyperliquid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_universe(&self, universe: Vec<AssetSpec>) {
        *self.universe.lock() = universe;
    }

    pub fn set_mid(&self, coin: &str, px: f64) {
        self.mids.lock().insert(coin.to_string(), px);
    }

    pub fn set_book(&self, book: L2Book) {
        self.books.lock().insert(book.coin.clone(), book);
    }

    /// Candles served by `candle_snapshot`, filtered to the requested window.
    pub fn set_candles(&self, candles: Vec<WireCandle>) {
        *self.candles.lock() = candles;
    }

    pub fn fail_candles(&self, fail: bool) {
        *self.candle_error.lock() = fail;
    }

    pub fn set_trades(&self, trades: Vec<WireTrade>) {
        *self.trades.lock() = trades;
    }

    pub fn set_state(&self, state: ClearinghouseState) {
        *self.state.lock() = Some(state);
    }

    pub fn fail_state_with(&self, status: u16) {
        *self.state_error.lock() = Some(status);
    }

    pub fn set_open_orders(&self, orders: Vec<Value>) {
        *self.orders.lock() = orders;
    }

    pub fn reject(&self, action_type: &str, message: &str) {
        self.reject
            .lock()
            .insert(action_type.to_string(), message.to_string());
    }

    pub fn reject_after(&self, accepted: usize, message: &str) {
        *self.reject_after.lock() = Some((accepted, message.to_string()));
    }

    pub fn submitted(&self) -> Vec<ExchangeRequest> {
        self.submitted.lock().clone()
    }

    pub fn candle_calls(&self) -> Vec<(i64, i64)> {
        self.candle_calls.lock().clone()
    }
}

impl HyperliquidApi for FakeHyperliquid {
    fn perp_universe(&self) -> BoxFuture<'_, ClientResult<Vec<AssetSpec>>> {
        Box::pin(async move { Ok(self.universe.lock().clone()) })
    }

    fn all_mids(&self) -> BoxFuture<'_, ClientResult<HashMap<String, f64>>> {
        Box::pin(async move { Ok(self.mids.lock().clone()) })
    }

    fn l2_book<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, ClientResult<L2Book>> {
        Box::pin(async move {
            self.books
                .lock()
                .get(coin)
                .cloned()
                .ok_or_else(|| ClientError::UnknownMarket(coin.to_string()))
        })
    }

    fn candle_snapshot<'a>(
        &'a self,
        _coin: &'a str,
        _interval: &'a str,
        start_ms: i64,
        end_ms: i64,
    ) -> BoxFuture<'a, ClientResult<Vec<WireCandle>>> {
        Box::pin(async move {
            self.candle_calls.lock().push((start_ms, end_ms));
            if *self.candle_error.lock() {
                return Err(ClientError::Status {
                    status: 500,
                    body: "candle snapshot unavailable".to_string(),
                });
            }
            Ok(self
                .candles
                .lock()
                .iter()
                .filter(|c| c.t >= start_ms && c.t <= end_ms)
                .cloned()
                .collect())
        })
    }

    fn recent_trades<'a>(&'a self, _coin: &'a str) -> BoxFuture<'a, ClientResult<Vec<WireTrade>>> {
        Box::pin(async move { Ok(self.trades.lock().clone()) })
    }

    fn clearinghouse_state<'a>(&'a self, _user: &'a str) -> BoxFuture<'a, ClientResult<ClearinghouseState>> {
        Box::pin(async move {
            if let Some(status) = *self.state_error.lock() {
                return Err(ClientError::Status {
                    status,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.state.lock().clone().unwrap_or_default())
        })
    }

    fn open_orders<'a>(&'a self, _user: &'a str) -> BoxFuture<'a, ClientResult<Vec<Value>>> {
        Box::pin(async move { Ok(self.orders.lock().clone()) })
    }

    fn exchange(&self, request: ExchangeRequest) -> BoxFuture<'_, ClientResult<Value>> {
        Box::pin(async move {
            let action = serde_json::to_value(&request.action)?;
            let kind = action
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let prior = {
                let mut submitted = self.submitted.lock();
                submitted.push(request);
                submitted.len() - 1
            };
            let after = self
                .reject_after
                .lock()
                .clone()
                .filter(|(accepted, _)| prior >= *accepted)
                .map(|(_, msg)| msg);
            if let Some(msg) = after.or_else(|| self.reject.lock().get(&kind).cloned()) {
                // Leverage updates fail at the top level, orders and cancels per status.
                let body = if kind == "updateLeverage" {
                    json!({"status": "err", "response": msg})
                } else {
                    json!({
                        "status": "ok",
                        "response": {"type": kind, "data": {"statuses": [{"error": msg}]}}
                    })
                };
                return check_exchange_response(body);
            }
            Ok(json!({
                "status": "ok",
                "response": {"type": kind, "data": {"statuses": [{"resting": {"oid": 1}}]}}
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_universe_from_meta_and_ctxs() {
        let body = json!([
            {"universe": [
                {"name": "BTC", "szDecimals": 5, "maxLeverage": 40},
                {"name": "ETH", "szDecimals": 4, "maxLeverage": 25}
            ]},
            [{"markPx": "97000"}, {"markPx": "3000"}]
        ]);
        let assets = parse_universe(&body).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[1].name, "ETH");
        assert_eq!(assets[1].index, 1);
        assert_eq!(assets[1].sz_decimals, 4);
    }

    #[test]
    fn test_parse_mids_skips_garbage() {
        let mids = parse_mids(&json!({"BTC": "97000.5", "ETH": 3000.0, "BAD": "x"}));
        assert_eq!(mids.get("BTC"), Some(&97000.5));
        assert_eq!(mids.get("ETH"), Some(&3000.0));
        assert!(!mids.contains_key("BAD"));
    }

    #[test]
    fn test_exchange_err_status_is_rejection() {
        let err = check_exchange_response(json!({"status": "err", "response": "Insufficient margin"}))
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "Insufficient margin"));
        assert!(check_exchange_response(json!({"status": "ok"})).is_ok());
    }

    #[test]
    fn test_exchange_status_error_is_rejection() {
        let body = json!({"status": "ok", "response": {"type": "order", "data": {"statuses": [
            {"error": "Insufficient margin to place order. asset=1"}
        ]}}});
        let err = check_exchange_response(body).unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m.starts_with("Insufficient margin")));
        assert_eq!(
            err.to_venue_error().kind,
            perpsvc_core::VenueErrorKind::InsufficientFunds
        );

        let resting = json!({"status": "ok", "response": {"type": "order", "data": {"statuses": [
            {"resting": {"oid": 77}}
        ]}}});
        assert_eq!(check_exchange_response(resting.clone()).unwrap(), resting);
    }

    #[test]
    fn test_first_status_error() {
        let body = json!({"status": "ok", "response": {"type": "order", "data": {"statuses": [
            {"error": "Order must have minimum value of $10."}
        ]}}});
        assert_eq!(
            first_status_error(&body).as_deref(),
            Some("Order must have minimum value of $10.")
        );
        assert_eq!(
            first_status_error(&json!({"response": {"data": {"statuses": [{"filled": {}}]}}})),
            None
        );
    }
}
