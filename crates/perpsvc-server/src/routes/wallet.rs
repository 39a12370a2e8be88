//! Custodial wallet endpoints: provisioning, balances, fees and withdrawals.

use super::{custodial_account, wallet_pubkey};
use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_json, AuthUser, JsonBody};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Json;
use perpsvc_core::LAMPORTS_PER_SOL;
use perpsvc_custody::MIN_USER_ID_LEN;
use perpsvc_ledger::{parse_pubkey, Pubkey};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_FEE_PROBE_LAMPORTS: u64 = 1_000;
const MIN_ADDRESS_LEN: usize = 6;

#[derive(Debug, Deserialize)]
struct CreateBody {
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

/// `POST /api/wallet/create`
pub async fn create(user: AuthUser, State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let body: CreateBody = parse_json(&body)?;
    if let Some(requested) = body.user_id.filter(|id| !id.is_empty()) {
        if requested != user.user_id {
            return Err(ApiError::forbidden("forbidden"));
        }
    }

    let wallet = state.services.wallets.ensure_wallet(&user.user_id).await?;
    Ok(Json(json!({
        "ok": true,
        "publicKey": wallet.public_key,
        "existed": wallet.existed,
    })))
}

/// `GET /api/wallet/balance`
pub async fn balance(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let Some(row) = state.services.wallets.wallet(&user.user_id).await? else {
        return Ok(Json(json!({ "lamports": 0, "sol": 0 })));
    };
    let owner = wallet_pubkey(&row)?;
    let balance = state.services.ledger.balance(owner).await?;
    Ok(Json(json!({
        "lamports": balance.lamports,
        "sol": balance.sol,
        "usdc": balance.usdc,
        "publicKey": row.public_key,
    })))
}

#[derive(Debug, Deserialize)]
pub struct FeeQuery {
    to: Option<String>,
    lamports: Option<u64>,
}

/// Sender and destination for a fee probe; no destination means a self-transfer.
async fn fee_endpoints(state: &AppState, user_id: &str, to: Option<&str>) -> ApiResult<(Pubkey, Pubkey)> {
    let row = state
        .services
        .wallets
        .wallet(user_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("no_wallet"))?;
    let from = wallet_pubkey(&row)?;
    let to = match to.filter(|s| !s.is_empty()) {
        Some(to) => parse_destination(to)?,
        None => from,
    };
    Ok((from, to))
}

fn parse_destination(to: &str) -> ApiResult<Pubkey> {
    Ok(parse_pubkey(to)?)
}

/// `GET /api/wallet/fee?to=&lamports=`
pub async fn fee(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FeeQuery>,
) -> ApiResult<Json<Value>> {
    let (from, to) = fee_endpoints(&state, &user.user_id, query.to.as_deref()).await?;
    let lamports = query.lamports.unwrap_or(DEFAULT_FEE_PROBE_LAMPORTS);
    let fee = state.services.ledger.estimate_fee(from, to, lamports).await?;
    Ok(Json(json!({ "feeLamports": fee })))
}

/// `GET /api/wallet/max-withdraw?to=`
pub async fn max_withdraw(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FeeQuery>,
) -> ApiResult<Json<Value>> {
    let (from, to) = fee_endpoints(&state, &user.user_id, query.to.as_deref()).await?;
    let max = state.services.ledger.max_withdraw(from, to).await?;
    Ok(Json(json!({
        "maxLamports": max.max_lamports,
        "maxSol": max.max_lamports as f64 / LAMPORTS_PER_SOL as f64,
        "feeLamports": max.fee_lamports,
        "safeFeeLamports": max.safe_fee_lamports,
        "iterations": max.iterations,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawBody {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    amount_sol: Option<f64>,
}

/// `POST /api/wallet/withdraw`
pub async fn withdraw(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<WithdrawBody>,
) -> ApiResult<Json<Value>> {
    let to = parse_destination(body.to.as_deref().unwrap_or_default())?;
    let amount = body
        .amount_sol
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| ApiError::bad_request("invalid_amount"))?;
    let account = custodial_account(&state, &user.user_id).await?;

    let lamports = (amount * LAMPORTS_PER_SOL as f64).floor() as u64;
    if lamports == 0 {
        return Err(ApiError::bad_request("invalid_amount"));
    }
    let signature = state
        .services
        .ledger
        .withdraw(&account.keypair, to, lamports)
        .await?;
    info!(user = %user.user_id, %to, lamports, %signature, "Withdrawal submitted");
    Ok(Json(json!({ "ok": true, "signature": signature })))
}

fn string_field(body: &Value, key: &str, min_len: usize) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| s.len() >= min_len)
        .map(str::to_string)
}

/// `POST /api/wallet/update-address1`
pub async fn update_address1(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let address1 = string_field(&body, "address1", MIN_ADDRESS_LEN)
        .ok_or_else(|| ApiError::bad_request("invalid_address1"))?;
    state
        .services
        .store
        .update_address1(&user.user_id, &address1)
        .await?;
    Ok(Json(json!({ "ok": true, "address1": address1 })))
}

/// `POST /api/wallet/upsert`
pub async fn upsert(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let address = string_field(&body, "address", MIN_USER_ID_LEN)
        .ok_or_else(|| ApiError::bad_request("invalid_address"))?;
    state
        .services
        .store
        .upsert_wallet(&address, &user.user_id)
        .await?;
    Ok(Json(json!({ "ok": true })))
}
