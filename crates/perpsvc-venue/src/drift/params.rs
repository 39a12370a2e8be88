//! Order parameters in Drift's fixed-point units.

use perpsvc_core::{OrderKind, OrderSide, OrderValidationError, Price, TimeInForce, ValidatedOrder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

/// Base asset amounts carry 9 decimals.
pub const BASE_PRECISION: u64 = 1_000_000_000;
/// Prices carry 6 decimals.
pub const PRICE_PRECISION: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftOrderParams {
    pub market_index: u16,
    pub direction: OrderSide,
    pub order_type: OrderKind,
    pub base_asset_amount: u64,
    /// 0 for market orders.
    pub price: u64,
    pub reduce_only: bool,
    pub post_only: bool,
    pub immediate_or_cancel: bool,
    /// USD notional the amount was derived from.
    #[serde(skip)]
    pub size_usd: Decimal,
}

impl DriftOrderParams {
    /// `reference` prices market orders; limit orders use their own price.
    ///
    /// `base = floor(notional / price * 1e9)`, `price = floor(limit * 1e6)`.
    pub fn from_order(
        order: &ValidatedOrder,
        market_index: u16,
        reference: Option<Price>,
    ) -> Result<Self, OrderValidationError> {
        let size_usd = order
            .notional_usd()
            .filter(|n| n.is_sign_positive() && !n.is_zero())
            .ok_or(OrderValidationError::InvalidOrderSize)?;

        let sizing_price = match order.kind {
            OrderKind::Limit => order.price,
            OrderKind::Market => reference,
        }
        .filter(|p| p.is_positive())
        .ok_or(OrderValidationError::InvalidOrderSize)?;

        let base = (size_usd / sizing_price.inner() * Decimal::from(BASE_PRECISION))
            .floor()
            .to_u64()
            .filter(|b| *b > 0)
            .ok_or(OrderValidationError::InvalidOrderSize)?;

        let price = match (order.kind, order.price) {
            (OrderKind::Limit, Some(px)) => (px.inner() * Decimal::from(PRICE_PRECISION))
                .floor()
                .to_u64()
                .unwrap_or(0),
            _ => 0,
        };

        Ok(Self {
            market_index,
            direction: order.side,
            order_type: order.kind,
            base_asset_amount: base,
            price,
            reduce_only: order.reduce_only,
            post_only: order.tif == TimeInForce::Alo,
            immediate_or_cancel: order.tif == TimeInForce::Ioc,
            size_usd,
        })
    }

    /// Gateway order body: signed amount and price in whole units.
    pub fn to_gateway_order(&self) -> Value {
        let amount = self.base_asset_amount as f64 / BASE_PRECISION as f64;
        let signed = match self.direction {
            OrderSide::Long => amount,
            OrderSide::Short => -amount,
        };
        let mut order = json!({
            "marketIndex": self.market_index,
            "marketType": "perp",
            "amount": signed,
            "orderType": self.order_type.to_string(),
            "reduceOnly": self.reduce_only,
            "postOnly": self.post_only,
            "immediateOrCancel": self.immediate_or_cancel,
        });
        if self.price > 0 {
            order["price"] = json!(self.price as f64 / PRICE_PRECISION as f64);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsvc_core::OrderRequest;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn validated(raw: Value) -> ValidatedOrder {
        serde_json::from_value::<OrderRequest>(raw)
            .unwrap()
            .validate()
            .unwrap()
    }

    #[test]
    fn test_limit_params() {
        let order = validated(json!({"symbol": "SOL-PERP", "side": "short", "type": "limit",
            "sizeUsd": 100, "price": 150.5, "postOnly": true}));
        let params = DriftOrderParams::from_order(&order, 0, None).unwrap();
        // 100 / 150.5 * 1e9, floored
        assert_eq!(params.base_asset_amount, 664_451_827);
        assert_eq!(params.price, 150_500_000);
        assert!(params.post_only);

        let wire = params.to_gateway_order();
        assert_eq!(wire["orderType"], "limit");
        assert!(wire["amount"].as_f64().unwrap() < 0.0);
        assert_eq!(wire["price"], 150.5);
    }

    #[test]
    fn test_market_params_use_reference() {
        let order = validated(json!({"symbol": "BTC", "side": "long", "type": "market", "sizeUsd": 50}));
        let params =
            DriftOrderParams::from_order(&order, 1, Some(Price::new(dec!(100000)))).unwrap();
        assert_eq!(params.base_asset_amount, 500_000);
        assert_eq!(params.price, 0);
        assert!(params.to_gateway_order().get("price").is_none());
        assert_eq!(params.size_usd, dec!(50));
    }

    #[test]
    fn test_missing_notional_is_invalid_size() {
        let order = validated(json!({"symbol": "SOL", "side": "long", "type": "market", "sizeCoin": 2}));
        assert_eq!(
            DriftOrderParams::from_order(&order, 0, Some(Price::new(dec!(150)))),
            Err(OrderValidationError::InvalidOrderSize)
        );
    }
}
