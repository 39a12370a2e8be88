//! Hyperliquid info wire types.
//!
//! Numbers arrive as decimal strings; `de_f64` accepts either a string or a
//! JSON number so the same types parse REST and WebSocket payloads.

use serde::{Deserialize, Deserializer, Serialize};

pub(crate) fn de_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        Str(String),
        Float(f64),
    }
    match Num::deserialize(d)? {
        Num::Float(v) => Ok(v),
        Num::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        Str(String),
        Float(f64),
    }
    Ok(match Option::<Num>::deserialize(d)? {
        None => None,
        Some(Num::Float(v)) => Some(v),
        Some(Num::Str(s)) => s.trim().parse().ok(),
    })
}

/// One price level of an `l2Book` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WireLevel {
    #[serde(deserialize_with = "de_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_f64")]
    pub sz: f64,
    #[serde(default)]
    pub n: u32,
}

/// `l2Book` snapshot: `levels[0]` are bids, `levels[1]` asks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct L2Book {
    pub coin: String,
    #[serde(default)]
    pub time: i64,
    pub levels: (Vec<WireLevel>, Vec<WireLevel>),
}

impl L2Book {
    pub fn bids(&self) -> &[WireLevel] {
        &self.levels.0
    }

    pub fn asks(&self) -> &[WireLevel] {
        &self.levels.1
    }
}

/// Candle as returned by `candleSnapshot` and the `candle` channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WireCandle {
    /// Open time (ms).
    pub t: i64,
    /// Close time (ms).
    #[serde(rename = "T", default)]
    pub close_time: i64,
    #[serde(default)]
    pub s: String,
    #[serde(default)]
    pub i: String,
    #[serde(deserialize_with = "de_f64")]
    pub o: f64,
    #[serde(deserialize_with = "de_f64")]
    pub h: f64,
    #[serde(deserialize_with = "de_f64")]
    pub l: f64,
    #[serde(deserialize_with = "de_f64")]
    pub c: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub v: Option<f64>,
}

/// Public trade print.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WireTrade {
    pub coin: String,
    /// "B" (buy aggressor) or "A" (sell aggressor).
    #[serde(default)]
    pub side: String,
    #[serde(deserialize_with = "de_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_f64")]
    pub sz: f64,
    pub time: i64,
}

/// Account margin totals from `clearinghouseState`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub account_value: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_ntl_pos: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_raw_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_margin_used: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LeverageInfo {
    #[serde(rename = "type", default)]
    pub leverage_type: Option<String>,
    #[serde(default)]
    pub value: Option<u32>,
}

/// Position data within an `assetPositions` entry. `szi` is signed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPosition {
    pub coin: String,
    #[serde(deserialize_with = "de_f64")]
    pub szi: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub entry_px: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub unrealized_pnl: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub margin_used: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub liquidation_px: Option<f64>,
    #[serde(default)]
    pub leverage: Option<LeverageInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetPositionEntry {
    pub position: AssetPosition,
}

/// `clearinghouseState` response.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    #[serde(default)]
    pub margin_summary: Option<MarginSummary>,
    #[serde(default)]
    pub asset_positions: Vec<AssetPositionEntry>,
    #[serde(default)]
    pub time: Option<i64>,
}
