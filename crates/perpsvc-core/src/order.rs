//! Order request model shared by the Hyperliquid and Drift proxies.
//!
//! Browser payloads arrive loosely typed; `OrderRequest::validate` turns
//! them into a `ValidatedOrder` or a stable error code.

use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Long,
    Short,
}

impl OrderSide {
    /// Returns the opposite side (used for TP/SL legs).
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Long orders buy.
    pub fn is_buy(&self) -> bool {
        matches!(self, Self::Long)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

impl OrderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "market" => Some(Self::Market),
            "limit" => Some(Self::Limit),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    Gtc,
    /// Immediate-or-cancel.
    Ioc,
    /// Add-liquidity-only (post only).
    Alo,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "Gtc"),
            Self::Ioc => write!(f, "Ioc"),
            Self::Alo => write!(f, "Alo"),
        }
    }
}

/// Raw trade request as posted by the browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub size_usd: Option<f64>,
    #[serde(default)]
    pub size_coin: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub cross: Option<bool>,
    #[serde(default)]
    pub tp_price: Option<f64>,
    #[serde(default)]
    pub sl_price: Option<f64>,
    #[serde(default)]
    pub reduce_only: Option<bool>,
    #[serde(default)]
    pub post_only: Option<bool>,
    #[serde(default)]
    pub ioc: Option<bool>,
}

/// Validation failures with their client-facing codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderValidationError {
    #[error("missing required fields")]
    MissingRequiredFields,
    #[error("side must be long or short")]
    InvalidSide,
    #[error("type must be market or limit")]
    InvalidType,
    #[error("limit orders require a price")]
    PriceRequiredForLimit,
    #[error("postOnly and ioc cannot both be set")]
    ConflictingTimeInForce,
    #[error("order size must be positive")]
    InvalidOrderSize,
}

impl OrderValidationError {
    /// Stable error code returned in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredFields => "missing_required_fields",
            Self::InvalidSide => "invalid_side",
            Self::InvalidType => "invalid_type",
            Self::PriceRequiredForLimit => "price_required_for_limit_order",
            Self::ConflictingTimeInForce => "conflicting_time_in_force",
            Self::InvalidOrderSize => "invalid_order_size",
        }
    }
}

/// A request that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    /// Display symbol as sent (e.g., "SOL-PERP").
    pub symbol: String,
    /// Venue coin with any `-PERP` suffix removed.
    pub coin: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size_usd: Option<Decimal>,
    pub size_coin: Option<Size>,
    pub price: Option<Price>,
    pub leverage: Option<u32>,
    pub cross: bool,
    pub tif: TimeInForce,
    pub reduce_only: bool,
    pub tp_price: Option<Price>,
    pub sl_price: Option<Price>,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<ValidatedOrder, OrderValidationError> {
        let symbol = self.symbol.as_deref().filter(|s| !s.is_empty());
        let side = self.side.as_deref().filter(|s| !s.is_empty());
        let kind = self.kind.as_deref().filter(|s| !s.is_empty());
        let has_size = self.size_usd.is_some() || self.size_coin.is_some();

        let (Some(symbol), Some(side), Some(kind)) = (symbol, side, kind) else {
            return Err(OrderValidationError::MissingRequiredFields);
        };
        if !has_size {
            return Err(OrderValidationError::MissingRequiredFields);
        }

        let side = OrderSide::parse(side).ok_or(OrderValidationError::InvalidSide)?;
        let kind = OrderKind::parse(kind).ok_or(OrderValidationError::InvalidType)?;

        let price = self
            .price
            .and_then(Price::from_f64)
            .filter(|p| p.is_positive());
        if kind == OrderKind::Limit && price.is_none() {
            return Err(OrderValidationError::PriceRequiredForLimit);
        }

        let post_only = self.post_only.unwrap_or(false);
        let ioc = self.ioc.unwrap_or(false);
        let tif = match (post_only, ioc) {
            (true, true) => return Err(OrderValidationError::ConflictingTimeInForce),
            (true, false) => TimeInForce::Alo,
            (false, true) => TimeInForce::Ioc,
            (false, false) => TimeInForce::Gtc,
        };

        let positive = |p: Option<f64>| p.and_then(Price::from_f64).filter(|p| p.is_positive());

        Ok(ValidatedOrder {
            symbol: symbol.to_string(),
            coin: strip_perp_suffix(symbol).to_string(),
            side,
            kind,
            size_usd: self
                .size_usd
                .and_then(|v| Price::from_f64(v).map(|p| p.inner())),
            size_coin: self.size_coin.and_then(Size::from_f64),
            price,
            leverage: self.leverage,
            cross: self.cross != Some(false),
            tif,
            reduce_only: self.reduce_only.unwrap_or(false),
            tp_price: positive(self.tp_price),
            sl_price: positive(self.sl_price),
        })
    }
}

impl ValidatedOrder {
    /// USD notional: `sizeUsd`, else `sizeCoin * price`.
    pub fn notional_usd(&self) -> Option<Decimal> {
        if let Some(usd) = self.size_usd {
            return Some(usd);
        }
        match (self.size_coin, self.price) {
            (Some(size), Some(price)) => Some(size.notional(price)),
            _ => None,
        }
    }

    /// Coin size: `sizeCoin`, else `sizeUsd / reference_price`.
    pub fn coin_size(&self, reference_price: Price) -> Size {
        if let Some(size) = self.size_coin {
            return size;
        }
        self.size_usd
            .map(|usd| usd / reference_price)
            .unwrap_or(Size::ZERO)
    }
}

/// "SOL-PERP" -> "SOL".
pub fn strip_perp_suffix(symbol: &str) -> &str {
    symbol.strip_suffix("-PERP").unwrap_or(symbol)
}
