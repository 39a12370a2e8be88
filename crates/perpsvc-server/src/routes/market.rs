//! Public market data: grouped order book, candles and mids.

use super::now_ms;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use perpsvc_market::{group_book, BookSnapshot, GroupedBook, Timeframe};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub(crate) const DEFAULT_COIN: &str = "BTC";

#[derive(Debug, Deserialize)]
pub struct BookQuery {
    pub coin: Option<String>,
    pub spread: Option<f64>,
}

pub(crate) fn coin_or_default(coin: Option<&str>) -> String {
    coin.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            let upper = c.to_ascii_uppercase();
            perpsvc_core::order::strip_perp_suffix(&upper).to_string()
        })
        .unwrap_or_else(|| DEFAULT_COIN.to_string())
}

/// Latest book for `coin`: the hub's push if there is one, else a fresh `l2Book`.
pub(crate) async fn latest_book(state: &AppState, coin: &str) -> ApiResult<BookSnapshot> {
    if let Some(book) = state.services.hub.book(coin) {
        return Ok(book);
    }
    debug!(coin, "No pushed book, fetching l2Book");
    let book = state.services.hyperliquid.api().l2_book(coin).await?;
    Ok(BookSnapshot::from(&book))
}

pub(crate) fn grouped(book: &BookSnapshot, spread: Option<f64>) -> GroupedBook {
    let mut rng = rand::thread_rng();
    group_book(&book.coin, &book.bids, &book.asks, spread, book.time, &mut rng)
}

/// `GET /api/market/orderbook?coin=BTC&spread=10`
pub async fn orderbook(State(state): State<AppState>, Query(query): Query<BookQuery>) -> ApiResult<Json<GroupedBook>> {
    let coin = coin_or_default(query.coin.as_deref());
    let book = latest_book(&state, &coin).await?;
    Ok(Json(grouped(&book, query.spread)))
}

#[derive(Debug, Deserialize)]
pub struct CandleQuery {
    coin: Option<String>,
    tf: Option<String>,
}

/// `GET /api/market/candles?coin=BTC&tf=1m`
pub async fn candles(State(state): State<AppState>, Query(query): Query<CandleQuery>) -> ApiResult<Json<Value>> {
    let coin = coin_or_default(query.coin.as_deref());
    let timeframe: Timeframe = match query.tf.as_deref().filter(|s| !s.is_empty()) {
        Some(tf) => tf.parse()?,
        None => Timeframe::M1,
    };

    let hub = &state.services.hub;
    let mid = hub.mid(&coin);
    let backfill = state
        .services
        .backfiller
        .backfill(&coin, timeframe, now_ms(), mid)
        .await;
    let candles = hub.seed(&coin, timeframe, backfill.candles);

    Ok(Json(json!({
        "coin": coin,
        "timeframe": timeframe,
        "strategy": backfill.strategy,
        "candles": candles,
    })))
}

/// `GET /api/market/mids`
pub async fn mids(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mids = state.services.hub.mids();
    if !mids.is_empty() {
        return Ok(Json(json!({ "mids": mids })));
    }
    match state.services.hyperliquid.api().all_mids().await {
        Ok(mids) => Ok(Json(json!({ "mids": mids }))),
        Err(e) => {
            warn!(error = %e, "allMids unavailable");
            Err(e.into())
        }
    }
}
