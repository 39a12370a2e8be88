//! Account overview, activity feed, PnL baseline and secret reveal.

use super::{now_ms, wallet_pubkey};
use crate::error::{ApiError, ApiResult};
use crate::extract::{AuthUser, JsonBody};
use crate::state::AppState;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use perpsvc_core::LAMPORTS_PER_SOL;
use perpsvc_ledger::{parse_activity, ACTIVITY_LIMIT};
use serde_json::{json, Value};
use tracing::{info, warn};

const MIN_PASSCODE_LEN: usize = 4;

/// `GET /api/account/overview`
pub async fn overview(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let usd_price = match state.services.hyperliquid.api().all_mids().await {
        Ok(mids) => mids.get("SOL").copied(),
        Err(e) => {
            warn!(error = %e, "SOL mid unavailable for overview");
            state.services.hub.mid("SOL")
        }
    };

    let Some(row) = state.services.wallets.wallet(&user.user_id).await? else {
        return Ok(Json(json!({
            "userId": user.user_id,
            "custodialPublicKey": null,
            "lamports": 0,
            "sol": 0,
            "usdPrice": usd_price,
            "usd": usd_price.map(|_| 0.0),
            "history": [],
        })));
    };

    let owner = wallet_pubkey(&row)?;
    let lamports = state.services.ledger.rpc().get_balance(owner).await?;
    let sol = lamports as f64 / LAMPORTS_PER_SOL as f64;
    let history = state
        .services
        .ledger
        .history(owner, Utc::now().timestamp())
        .await;

    Ok(Json(json!({
        "userId": user.user_id,
        "custodialPublicKey": row.public_key,
        "lamports": lamports,
        "sol": sol,
        "usdPrice": usd_price,
        "usd": usd_price.map(|px| px * sol),
        "history": history,
    })))
}

/// `GET /api/account/activity`
pub async fn activity(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let Some(row) = state.services.wallets.wallet(&user.user_id).await? else {
        return Ok(Json(json!({ "activity": [] })));
    };
    let txs = state
        .services
        .activity
        .transactions(&row.public_key, ACTIVITY_LIMIT)
        .await?;
    let activity = parse_activity(&row.public_key, &txs, now_ms());
    Ok(Json(json!({ "address": row.public_key, "activity": activity })))
}

/// `GET /api/account/baseline`
pub async fn get_baseline(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let settings = state.services.store.account_settings(&user.user_id).await?;
    Ok(Json(json!({
        "baselineUsd": settings.as_ref().and_then(|s| s.pnl_baseline_usd),
        "baselineAt": settings.and_then(|s| s.pnl_baseline_at),
    })))
}

/// `POST /api/account/baseline`
pub async fn set_baseline(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let baseline = body
        .get("baselineUsd")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::bad_request("invalid_baseline"))?;
    let settings = state
        .services
        .store
        .upsert_baseline(&user.user_id, baseline, Utc::now())
        .await?;
    Ok(Json(json!({
        "ok": true,
        "baselineUsd": settings.pnl_baseline_usd,
        "baselineAt": settings.pnl_baseline_at,
    })))
}

/// `GET /api/account/secret`
pub async fn get_secret(user: AuthUser, State(state): State<AppState>) -> ApiResult<Response> {
    if state.policy.reveal_passcode.is_some() {
        return Err(ApiError::forbidden("passcode_required"));
    }
    reveal(&state, &user).await
}

/// `POST /api/account/secret`
pub async fn post_secret(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Response> {
    let passcode = body
        .get("passcode")
        .and_then(Value::as_str)
        .filter(|p| p.chars().count() >= MIN_PASSCODE_LEN)
        .ok_or_else(|| ApiError::bad_request("invalid_passcode"))?;
    if let Some(expected) = &state.policy.reveal_passcode {
        if passcode != expected {
            warn!(user = %user.user_id, "Secret reveal with wrong passcode");
            return Err(ApiError::forbidden("forbidden"));
        }
    }
    reveal(&state, &user).await
}

async fn reveal(state: &AppState, user: &AuthUser) -> ApiResult<Response> {
    let account = state
        .services
        .wallets
        .load(&user.user_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    info!(user = %user.user_id, public_key = %account.row.public_key, "Custodial secret revealed");

    let body = json!({
        "secretKeyB64": account.keypair.secret_key_b64().as_str(),
        "secretKeyB58": account.keypair.secret_key_b58().as_str(),
    });
    Ok(([(CACHE_CONTROL, "no-store")], Json(body)).into_response())
}
