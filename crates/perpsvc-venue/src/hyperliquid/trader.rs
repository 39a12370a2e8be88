//! Order placement on Hyperliquid for custodial accounts.

use super::client::DynHyperliquidApi;
use super::nonce::NonceSource;
use super::signing::{Action, HyperliquidSigner, OrderTypeWire, OrderWire};
use crate::error::{ClientError, ClientResult};
use perpsvc_core::{AssetSpec, OrderKind, Price, Size, TimeInForce, ValidatedOrder};
use perpsvc_telemetry::Metrics;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Market orders go out as IOC limits this far through the mid.
pub const MARKET_SLIPPAGE_PCT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    TakeProfit,
    StopLoss,
}

/// Outcome of a TP or SL leg. A failed leg does not fail the order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegResult {
    #[serde(rename = "type")]
    pub kind: LegKind,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub main: Value,
    pub additional: Vec<LegResult>,
}

pub struct HyperliquidTrader {
    api: DynHyperliquidApi,
    nonces: Arc<NonceSource>,
    is_mainnet: bool,
}

impl HyperliquidTrader {
    pub fn new(api: DynHyperliquidApi, is_mainnet: bool) -> Self {
        Self {
            api,
            nonces: Arc::new(NonceSource::default()),
            is_mainnet,
        }
    }

    pub fn api(&self) -> &DynHyperliquidApi {
        &self.api
    }

    pub fn is_mainnet(&self) -> bool {
        self.is_mainnet
    }

    /// Universe entry for `coin`; asset 0 with default precision when absent.
    pub async fn asset(&self, coin: &str) -> AssetSpec {
        match self.api.perp_universe().await {
            Ok(universe) => universe
                .into_iter()
                .find(|a| a.name == coin)
                .unwrap_or_else(|| {
                    warn!(coin, "Coin not in perp universe, using asset 0");
                    AssetSpec::fallback(coin)
                }),
            Err(e) => {
                warn!(coin, error = %e, "Universe lookup failed, using asset 0");
                AssetSpec::fallback(coin)
            }
        }
    }

    pub async fn mid(&self, coin: &str) -> ClientResult<Price> {
        let mids = self.api.all_mids().await?;
        mids.get(coin)
            .copied()
            .and_then(Price::from_f64)
            .filter(|p| p.is_positive())
            .ok_or_else(|| ClientError::UnknownMarket(coin.to_string()))
    }

    pub async fn place_order(
        &self,
        signer: &HyperliquidSigner,
        order: &ValidatedOrder,
    ) -> ClientResult<PlacedOrder> {
        let result = self.place_order_inner(signer, order).await;
        Metrics::order("hyperliquid", result.is_ok());
        if let Err(e) = &result {
            Metrics::venue_error("hyperliquid", e.to_venue_error().kind.code());
        }
        result
    }

    async fn place_order_inner(
        &self,
        signer: &HyperliquidSigner,
        order: &ValidatedOrder,
    ) -> ClientResult<PlacedOrder> {
        let asset = self.asset(&order.coin).await;

        let (limit_px, tif, reference) = match (order.kind, order.price) {
            (OrderKind::Limit, Some(px)) => (px, order.tif, px),
            _ => {
                let mid = self.mid(&order.coin).await?;
                let pct = Decimal::from(MARKET_SLIPPAGE_PCT);
                let px = if order.side.is_buy() {
                    mid.shifted_pct(pct)
                } else {
                    mid.shifted_pct(-pct)
                };
                (px, TimeInForce::Ioc, mid)
            }
        };

        let size = order.coin_size(reference).floor_to_decimals(asset.sz_decimals);
        if !size.is_positive() {
            return Err(ClientError::Rejected(format!(
                "order size rounds to zero at {} decimals",
                asset.sz_decimals
            )));
        }

        if let Some(leverage) = order.leverage.filter(|l| *l != 1) {
            self.submit(
                signer,
                Action::UpdateLeverage {
                    asset: asset.index,
                    is_cross: order.cross,
                    leverage,
                },
            )
            .await?;
        }

        let main_wire = OrderWire {
            asset: asset.index,
            is_buy: order.side.is_buy(),
            limit_px: asset.format_price(limit_px),
            sz: asset.format_size(size),
            reduce_only: order.reduce_only,
            order_type: OrderTypeWire::limit(tif),
        };
        let main = self.submit(signer, Action::single_order(main_wire)).await?;
        info!(
            coin = %order.coin,
            side = %order.side,
            kind = %order.kind,
            size = %size,
            "Hyperliquid order submitted"
        );

        let mut additional = Vec::new();
        for (kind, trigger) in [
            (LegKind::TakeProfit, order.tp_price),
            (LegKind::StopLoss, order.sl_price),
        ] {
            if let Some(px) = trigger {
                additional.push(self.place_leg(signer, &asset, order, size, kind, px).await);
            }
        }

        Ok(PlacedOrder { main, additional })
    }

    async fn place_leg(
        &self,
        signer: &HyperliquidSigner,
        asset: &AssetSpec,
        order: &ValidatedOrder,
        size: Size,
        kind: LegKind,
        px: Price,
    ) -> LegResult {
        let wire = OrderWire {
            asset: asset.index,
            is_buy: order.side.opposite().is_buy(),
            limit_px: asset.format_price(px),
            sz: asset.format_size(size),
            reduce_only: true,
            order_type: OrderTypeWire::limit(TimeInForce::Gtc),
        };
        match self.submit(signer, Action::single_order(wire)).await {
            Ok(result) => LegResult {
                kind,
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                warn!(coin = %order.coin, leg = ?kind, error = %e, "Failed to place protective order");
                LegResult {
                    kind,
                    ok: false,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn cancel(&self, signer: &HyperliquidSigner, coin: &str, oid: u64) -> ClientResult<Value> {
        let asset = self.asset(coin).await;
        self.submit(signer, Action::cancel(asset.index, oid)).await
    }

    async fn submit(&self, signer: &HyperliquidSigner, action: Action) -> ClientResult<Value> {
        let request = signer.sign(action, self.nonces.next()).await?;
        self.api.exchange(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperliquid::client::FakeHyperliquid;
    use perpsvc_core::OrderRequest;
    use perpsvc_custody::CustodialKeypair;
    use serde_json::json;

    fn setup() -> (Arc<FakeHyperliquid>, HyperliquidTrader, HyperliquidSigner) {
        let fake = Arc::new(FakeHyperliquid::new());
        fake.set_universe(vec![
            AssetSpec {
                index: 0,
                name: "BTC".to_string(),
                sz_decimals: 5,
                max_leverage: 40,
            },
            AssetSpec {
                index: 1,
                name: "ETH".to_string(),
                sz_decimals: 4,
                max_leverage: 25,
            },
        ]);
        fake.set_mid("ETH", 2000.0);
        let trader = HyperliquidTrader::new(fake.clone(), true);
        let signer =
            HyperliquidSigner::from_keypair(&CustodialKeypair::from_seed(&[3u8; 32]), true).unwrap();
        (fake, trader, signer)
    }

    fn order(raw: serde_json::Value) -> ValidatedOrder {
        serde_json::from_value::<OrderRequest>(raw)
            .unwrap()
            .validate()
            .unwrap()
    }

    fn action(req: &super::super::signing::ExchangeRequest) -> serde_json::Value {
        serde_json::to_value(&req.action).unwrap()
    }

    #[tokio::test]
    async fn test_market_order_is_aggressive_ioc() {
        let (fake, trader, signer) = setup();
        let placed = trader
            .place_order(
                &signer,
                &order(json!({"symbol": "ETH-PERP", "side": "long", "type": "market", "sizeUsd": 100})),
            )
            .await
            .unwrap();
        assert!(placed.additional.is_empty());

        let sent = fake.submitted();
        assert_eq!(sent.len(), 1);
        let wire = &action(&sent[0])["orders"][0];
        assert_eq!(wire["a"], 1);
        assert_eq!(wire["b"], true);
        assert_eq!(wire["p"], "2100");
        assert_eq!(wire["s"], "0.05");
        assert_eq!(wire["t"]["limit"]["tif"], "Ioc");
    }

    #[tokio::test]
    async fn test_leverage_update_precedes_order() {
        let (fake, trader, signer) = setup();
        trader
            .place_order(
                &signer,
                &order(json!({"symbol": "ETH", "side": "short", "type": "limit",
                    "sizeCoin": 1.5, "price": 2500, "leverage": 10, "cross": false})),
            )
            .await
            .unwrap();

        let sent = fake.submitted();
        assert_eq!(sent.len(), 2);
        let lev = action(&sent[0]);
        assert_eq!(lev["type"], "updateLeverage");
        assert_eq!(lev["isCross"], false);
        assert_eq!(lev["leverage"], 10);
        let wire = &action(&sent[1])["orders"][0];
        assert_eq!(wire["p"], "2500");
        assert_eq!(wire["s"], "1.5");
        assert_eq!(wire["t"]["limit"]["tif"], "Gtc");
        assert!(sent[1].nonce > sent[0].nonce);
    }

    #[tokio::test]
    async fn test_failed_leg_is_reported_not_fatal() {
        let (fake, trader, signer) = setup();
        let placed = trader
            .place_order(
                &signer,
                &order(json!({"symbol": "ETH", "side": "long", "type": "limit",
                    "sizeCoin": 1, "price": 2000, "tpPrice": 2200, "slPrice": 1900})),
            )
            .await
            .unwrap();
        assert_eq!(placed.additional.len(), 2);
        assert!(placed.additional.iter().all(|l| l.ok));

        let sent = fake.submitted();
        let tp = &action(&sent[1])["orders"][0];
        assert_eq!(tp["b"], false);
        assert_eq!(tp["r"], true);
        assert_eq!(tp["p"], "2200");

        // A rejected leg leaves the main order standing.
        let (fake, trader, signer) = setup();
        fake.reject_after(1, "Reduce only order would increase position");
        let placed = trader
            .place_order(
                &signer,
                &order(json!({"symbol": "ETH", "side": "long", "type": "limit",
                    "sizeCoin": 1, "price": 2000, "tpPrice": 2200})),
            )
            .await
            .unwrap();
        assert_eq!(placed.main["status"], "ok");
        let leg = &placed.additional[0];
        assert_eq!(leg.kind, LegKind::TakeProfit);
        assert!(!leg.ok);
        assert!(leg.error.as_deref().unwrap().contains("Reduce only"));
    }

    #[tokio::test]
    async fn test_rejection_maps_to_venue_error() {
        let (fake, trader, signer) = setup();
        fake.reject("order", "Insufficient margin to place order.");
        let err = trader
            .place_order(
                &signer,
                &order(json!({"symbol": "ETH", "side": "long", "type": "limit", "sizeCoin": 1, "price": 2000})),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_venue_error().kind,
            perpsvc_core::VenueErrorKind::InsufficientFunds
        );
    }

    #[tokio::test]
    async fn test_leverage_rejection_stops_before_order() {
        let (fake, trader, signer) = setup();
        fake.reject("updateLeverage", "Invalid leverage value");
        let err = trader
            .place_order(
                &signer,
                &order(json!({"symbol": "ETH", "side": "long", "type": "limit",
                    "sizeCoin": 1, "price": 2000, "leverage": 30})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(fake.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_coin_uses_asset_zero() {
        let (fake, trader, signer) = setup();
        trader
            .place_order(
                &signer,
                &order(json!({"symbol": "NEW", "side": "long", "type": "limit", "sizeCoin": 1, "price": 3})),
            )
            .await
            .unwrap();
        assert_eq!(action(&fake.submitted()[0])["orders"][0]["a"], 0);
    }

    #[tokio::test]
    async fn test_cancel_resolves_asset() {
        let (fake, trader, signer) = setup();
        trader.cancel(&signer, "ETH", 99).await.unwrap();
        let sent = action(&fake.submitted()[0]);
        assert_eq!(sent["cancels"][0]["a"], 1);
        assert_eq!(sent["cancels"][0]["o"], 99);
    }
}
