//! Position and margin views over `clearinghouseState`.

use super::types::{AssetPosition, ClearinghouseState, MarginSummary};
use perpsvc_core::OrderSide;
use serde::Serialize;
use serde_json::Value;

/// Distance from entry used for the displayed liquidation estimate.
pub const LIQUIDATION_BUFFER: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub coin: String,
    pub side: OrderSide,
    pub size: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    pub leverage: f64,
    pub margin_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<f64>,
}

impl PositionView {
    pub fn from_position(pos: &AssetPosition) -> Self {
        Self {
            coin: pos.coin.clone(),
            side: if pos.szi > 0.0 {
                OrderSide::Long
            } else {
                OrderSide::Short
            },
            size: pos.szi.abs(),
            entry_price: pos.entry_px.unwrap_or(0.0),
            unrealized_pnl: pos.unrealized_pnl.unwrap_or(0.0),
            leverage: pos
                .leverage
                .as_ref()
                .and_then(|l| l.value)
                .map(f64::from)
                .unwrap_or(1.0),
            margin_used: pos.margin_used.unwrap_or(0.0),
            liquidation_price: None,
        }
    }

    pub fn with_liquidation_estimate(mut self) -> Self {
        self.liquidation_price = Some(estimated_liquidation_price(
            self.side,
            self.size,
            self.entry_price,
            self.margin_used,
        ));
        self
    }
}

/// Entry minus 10% for longs, plus 10% for shorts; 0 without size or margin.
pub fn estimated_liquidation_price(side: OrderSide, size: f64, entry: f64, margin_used: f64) -> f64 {
    if size == 0.0 || margin_used == 0.0 {
        return 0.0;
    }
    match side {
        OrderSide::Long => entry * (1.0 - LIQUIDATION_BUFFER),
        OrderSide::Short => entry * (1.0 + LIQUIDATION_BUFFER),
    }
}

/// Open positions with zero sizes dropped.
pub fn positions(state: &ClearinghouseState) -> Vec<PositionView> {
    state
        .asset_positions
        .iter()
        .map(|entry| PositionView::from_position(&entry.position))
        .filter(|p| p.size > 0.0)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginView {
    pub total_margin_used: f64,
    pub total_ntl_pos: f64,
    pub available_margin: f64,
    pub margin_ratio: f64,
}

impl MarginView {
    pub fn from_summary(summary: Option<&MarginSummary>) -> Self {
        let used = summary.and_then(|s| s.total_margin_used).unwrap_or(0.0);
        let ntl = summary.and_then(|s| s.total_ntl_pos).unwrap_or(0.0);
        Self {
            total_margin_used: used,
            total_ntl_pos: ntl,
            available_margin: ntl - used,
            margin_ratio: if ntl > 0.0 { used / ntl } else { 0.0 },
        }
    }
}

/// Resting order as shown in the positions panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderView {
    pub oid: u64,
    pub coin: String,
    pub side: String,
    pub limit_px: f64,
    pub sz: f64,
    pub timestamp: i64,
    pub reduce_only: bool,
}

impl OpenOrderView {
    pub fn from_value(order: &Value) -> Option<Self> {
        let num = |key: &str| match order.get(key)? {
            Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        };
        Some(Self {
            oid: order.get("oid")?.as_u64()?,
            coin: order.get("coin")?.as_str()?.to_string(),
            side: order
                .get("side")
                .and_then(Value::as_str)
                .unwrap_or("B")
                .to_string(),
            limit_px: num("limitPx").unwrap_or(0.0),
            sz: num("sz").unwrap_or(0.0),
            timestamp: order.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
            reduce_only: order
                .get("reduceOnly")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}
