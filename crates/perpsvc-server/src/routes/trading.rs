//! Order proxy for Hyperliquid and Drift, plus position views.

use super::{custodial_account, now_ms, wallet_pubkey};
use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_json, AuthUser, JsonBody};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use perpsvc_core::{OrderRequest, Price};
use perpsvc_custody::CustodialKeypair;
use perpsvc_venue::hyperliquid::{positions, MarginView, OpenOrderView};
use perpsvc_venue::{market_index, HyperliquidSigner};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

fn signer_for(state: &AppState, keypair: &CustodialKeypair) -> ApiResult<HyperliquidSigner> {
    Ok(HyperliquidSigner::from_keypair(
        keypair,
        state.services.hyperliquid.is_mainnet(),
    )?)
}

/// Hyperliquid address of the user's custodial key, if there is one.
async fn hyperliquid_address(state: &AppState, user_id: &str) -> ApiResult<Option<String>> {
    match state.services.wallets.load(user_id).await? {
        Some(account) => Ok(Some(signer_for(state, &account.keypair)?.address_hex())),
        None => Ok(None),
    }
}

/// `POST /api/trading/place-order`
pub async fn place_order(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<OrderRequest>,
) -> ApiResult<Json<Value>> {
    let order = request.validate()?;
    let account = custodial_account(&state, &user.user_id).await?;
    let signer = signer_for(&state, &account.keypair)?;

    let placed = state.services.hyperliquid.place_order(&signer, &order).await?;
    info!(
        user = %user.user_id,
        coin = %order.coin,
        side = %order.side,
        kind = %order.kind,
        legs = placed.additional.len(),
        "Hyperliquid order placed"
    );
    Ok(Json(json!({
        "success": true,
        "mainOrder": placed.main,
        "additionalOrders": placed.additional,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    coin: Option<String>,
    #[serde(default)]
    oid: Option<u64>,
}

/// `POST /api/trading/cancel-order`
pub async fn cancel_order(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CancelBody>,
) -> ApiResult<Json<Value>> {
    let (Some(coin), Some(oid)) = (body.coin.filter(|c| !c.is_empty()), body.oid) else {
        return Err(ApiError::bad_request("missing_required_fields"));
    };
    let coin = perpsvc_core::order::strip_perp_suffix(&coin).to_string();
    let account = custodial_account(&state, &user.user_id).await?;
    let signer = signer_for(&state, &account.keypair)?;

    let result = state.services.hyperliquid.cancel(&signer, &coin, oid).await?;
    info!(user = %user.user_id, %coin, oid, "Order cancelled");
    Ok(Json(json!({ "success": true, "result": result })))
}

/// `GET /api/trading/active-orders`
pub async fn active_orders(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let Some(address) = hyperliquid_address(&state, &user.user_id).await? else {
        return Ok(Json(json!({ "orders": [] })));
    };
    let raw = state.services.hyperliquid.api().open_orders(&address).await?;
    let orders: Vec<OpenOrderView> = raw.iter().filter_map(OpenOrderView::from_value).collect();
    Ok(Json(json!({ "orders": orders })))
}

fn empty_positions(error: Option<&str>) -> Json<Value> {
    let mut body = json!({
        "positions": [],
        "openOrders": [],
        "marginSummary": null,
    });
    if let Some(error) = error {
        body["error"] = json!(error);
    }
    Json(body)
}

/// `GET /api/trading/positions`
pub async fn positions_handler(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let Some(address) = hyperliquid_address(&state, &user.user_id).await? else {
        return Ok(empty_positions(Some("no_custodial_wallet")));
    };
    if !state.positions_limiter.check(&user.user_id) {
        warn!(user = %user.user_id, "Positions rate limit hit");
        return Err(ApiError::new(
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
        ));
    }

    let api = state.services.hyperliquid.api();
    let clearinghouse = match api.clearinghouse_state(&address).await {
        Ok(s) => s,
        Err(e) => {
            warn!(user = %user.user_id, status = ?e.status(), error = %e, "clearinghouseState failed");
            return Ok(empty_positions(None));
        }
    };
    let open_orders: Vec<OpenOrderView> = match api.open_orders(&address).await {
        Ok(raw) => raw.iter().filter_map(OpenOrderView::from_value).collect(),
        Err(e) => {
            warn!(user = %user.user_id, error = %e, "openOrders failed");
            Vec::new()
        }
    };

    Ok(Json(json!({
        "positions": positions(&clearinghouse),
        "openOrders": open_orders,
        "marginSummary": clearinghouse.margin_summary,
    })))
}

/// `GET /api/trading/position-monitor`
pub async fn position_monitor(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let Some(address) = hyperliquid_address(&state, &user.user_id).await? else {
        return Ok(Json(json!({
            "positions": [],
            "marginSummary": MarginView::from_summary(None),
            "timestamp": now_ms(),
            "error": "no_custodial_wallet",
        })));
    };
    let clearinghouse = state
        .services
        .hyperliquid
        .api()
        .clearinghouse_state(&address)
        .await?;

    let monitored: Vec<_> = positions(&clearinghouse)
        .into_iter()
        .map(|p| p.with_liquidation_estimate())
        .collect();
    Ok(Json(json!({
        "positions": monitored,
        "marginSummary": MarginView::from_summary(clearinghouse.margin_summary.as_ref()),
        "timestamp": now_ms(),
    })))
}

/// `POST /api/trading/drift-place-order`
pub async fn drift_place_order(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<OrderRequest>,
) -> ApiResult<Json<Value>> {
    let order = request.validate()?;
    let index = market_index(&order.symbol)
        .ok_or_else(|| ApiError::bad_request("invalid_market_index"))?;
    if !order.notional_usd().is_some_and(|n| n.is_sign_positive() && !n.is_zero()) {
        return Err(ApiError::bad_request("invalid_order_size"));
    }

    let account = custodial_account(&state, &user.user_id).await?;
    let authority = wallet_pubkey(&account.row)?;
    let lamports = state.services.ledger.rpc().get_balance(authority).await?;
    if lamports < state.policy.drift_min_lamports {
        return Err(ApiError::bad_request("insufficient_funds")
            .with("balanceLamports", lamports)
            .with("requiredLamports", state.policy.drift_min_lamports));
    }

    let reference = match order.price {
        Some(_) => None,
        None => reference_price(&state, &order.coin).await,
    };
    let sub_account = account
        .row
        .drift_subaccount
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(state.policy.drift_default_subaccount);

    let placed = state
        .services
        .drift
        .place_order(&authority, sub_account, &order, reference)
        .await?;

    let price = order.price.or(reference).map(|p| p.to_f64());
    Ok(Json(json!({
        "success": true,
        "txSignature": placed.signature,
        "orderParams": {
            "symbol": order.symbol,
            "side": order.side,
            "type": order.kind,
            "sizeUsd": placed.params.size_usd,
            "price": price,
            "marketIndex": index,
        },
    })))
}

/// Mid used to size Drift market orders: live hub first, then the venue.
async fn reference_price(state: &AppState, coin: &str) -> Option<Price> {
    if let Some(px) = state
        .services
        .hub
        .mid(coin)
        .and_then(Price::from_f64)
        .filter(|p| p.is_positive())
    {
        return Some(px);
    }
    match state.services.hyperliquid.mid(coin).await {
        Ok(px) => Some(px),
        Err(e) => {
            warn!(coin, error = %e, "No reference price for market order");
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitUserBody {
    #[serde(default)]
    sub_account_id: Option<u16>,
}

/// `POST /api/trading/drift-init-user`
pub async fn drift_init_user(user: AuthUser, State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let body: InitUserBody = parse_json(&body)?;
    let account = custodial_account(&state, &user.user_id).await?;
    let authority = wallet_pubkey(&account.row)?;

    let stored = account.row.drift_subaccount.and_then(|s| u16::try_from(s).ok());
    let sub_account = stored
        .or(body.sub_account_id)
        .unwrap_or(state.policy.drift_default_subaccount);

    let pda = state.services.drift.init_user(&authority, sub_account).await?;
    let pda = pda.to_string();
    if account.row.drift_subaccount.is_none() || account.row.drift_user_pda.is_none() {
        state
            .services
            .store
            .set_drift_account(&user.user_id, i32::from(sub_account), &pda)
            .await?;
        info!(user = %user.user_id, sub_account, user_account = %pda, "Drift account recorded");
    }

    Ok(Json(json!({
        "success": true,
        "userAccount": pda,
        "drift_subaccount": sub_account,
        "drift_user_pda": pda,
    })))
}
