//! SOL/USDC quotes and custodial swaps through Jupiter.

use super::custodial_account;
use crate::error::{ApiError, ApiResult};
use crate::extract::{AuthUser, JsonBody};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use perpsvc_core::Token;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    from: Option<String>,
    to: Option<String>,
}

fn parse_token(raw: Option<&str>, default: Token) -> ApiResult<Token> {
    match raw.filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map_err(|_| ApiError::bad_request("unsupported_token")),
        None => Ok(default),
    }
}

/// `GET /api/exchange/rate?from=SOL&to=USDC`
pub async fn rate(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<RateQuery>,
) -> ApiResult<Json<Value>> {
    let from = parse_token(query.from.as_deref(), Token::Sol)?;
    let to = parse_token(query.to.as_deref(), Token::Usdc)?;
    if from == to {
        return Err(ApiError::bad_request("unsupported_token_pair"));
    }
    let quote = state.services.swapper.rate(from, to).await?;
    Ok(Json(serde_json::to_value(quote).map_err(|_| ApiError::internal("internal_error"))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapBody {
    #[serde(default)]
    from_token: Option<String>,
    #[serde(default)]
    to_token: Option<String>,
    /// Accepts a number or a numeric string.
    #[serde(default)]
    amount: Option<Value>,
}

fn amount_value(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `POST /api/exchange/swap`
pub async fn swap(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SwapBody>,
) -> ApiResult<Json<Value>> {
    let (Some(from), Some(to), Some(amount)) = (
        body.from_token.filter(|s| !s.is_empty()),
        body.to_token.filter(|s| !s.is_empty()),
        body.amount.filter(|v| !v.is_null()),
    ) else {
        return Err(ApiError::bad_request("missing_required_fields"));
    };

    let pair = (from.parse::<Token>(), to.parse::<Token>());
    let (from, to) = match pair {
        (Ok(from), Ok(to)) if from != to => (from, to),
        _ => return Err(ApiError::bad_request("unsupported_token_pair")),
    };
    let amount = amount_value(&amount)
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| ApiError::bad_request("invalid_amount"))?;

    let account = custodial_account(&state, &user.user_id).await?;
    let receipt = state
        .services
        .swapper
        .swap(&account.keypair, from, to, amount)
        .await?;
    info!(user = %user.user_id, %from, %to, amount, signature = %receipt.signature, "Swap settled");

    let mut body = json!({ "success": true });
    if let (Some(out), Ok(Value::Object(receipt))) = (body.as_object_mut(), serde_json::to_value(&receipt)) {
        out.extend(receipt);
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_value_accepts_numbers_and_strings() {
        assert_eq!(amount_value(&json!(1.5)), Some(1.5));
        assert_eq!(amount_value(&json!(" 2 ")), Some(2.0));
        assert_eq!(amount_value(&json!("abc")), None);
        assert_eq!(amount_value(&json!(true)), None);
    }

    #[test]
    fn test_parse_token_defaults_and_rejects() {
        assert_eq!(parse_token(None, Token::Sol).unwrap(), Token::Sol);
        assert_eq!(parse_token(Some("usdc"), Token::Sol).unwrap(), Token::Usdc);
        let err = parse_token(Some("BONK"), Token::Sol).unwrap_err();
        assert_eq!(err.code, "unsupported_token");
    }
}
