//! Login, logout and the current-user summary.

use crate::error::{ApiError, ApiResult};
use crate::extract::{authenticate, cookie_value, parse_json, AuthUser};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use perpsvc_auth::{
    clear_cookie, generate_nonce, set_cookie, AuthError, LoginChallenge, SessionClaims,
    NONCE_COOKIE, NONCE_MAX_AGE_SECS, SESSION_COOKIE, SESSION_MAX_AGE_SECS,
};
use perpsvc_store::SessionRow;
use perpsvc_telemetry::Metrics;
use serde_json::{json, Value};
use tracing::{info, warn};

/// `GET /api/auth/nonce`
pub async fn nonce(State(state): State<AppState>) -> Response {
    let nonce = generate_nonce();
    let cookie = set_cookie(NONCE_COOKIE, &nonce, NONCE_MAX_AGE_SECS, state.cookie_options());
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(json!({ "nonce": nonce })),
    )
        .into_response()
}

/// `POST /api/auth/verify`
pub async fn verify(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Response> {
    match login(&state, &headers, &body).await {
        Ok(response) => {
            Metrics::login("ok");
            Ok(response)
        }
        Err(e) => {
            Metrics::login(&e.code);
            Err(e)
        }
    }
}

async fn login(state: &AppState, headers: &HeaderMap, body: &[u8]) -> ApiResult<Response> {
    let payload: Value = parse_json(body).map_err(|_| AuthError::InvalidPayload)?;
    let challenge = LoginChallenge::from_json(&payload)?;
    let nonce = cookie_value(headers, NONCE_COOKIE);
    challenge.verify(nonce.as_deref())?;

    let address = challenge.address;
    let now = Utc::now();
    state.services.store.record_login(&address, now).await?;

    let claims = SessionClaims::new(address.clone(), now.timestamp());
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
        .ok_or_else(|| ApiError::internal("server_misconfigured"))?;
    state
        .services
        .store
        .create_session(SessionRow {
            id: claims.sid,
            user_id: address.clone(),
            created_at: now,
            expires_at,
            revoked_at: None,
        })
        .await?;
    let token = state.services.sessions.sign(&claims);
    info!(user = %address, sid = %claims.sid, "User signed in");

    let opts = state.cookie_options();
    Ok((
        AppendHeaders([
            (SET_COOKIE, set_cookie(SESSION_COOKIE, &token, SESSION_MAX_AGE_SECS, opts)),
            (SET_COOKIE, clear_cookie(NONCE_COOKIE, opts)),
        ]),
        Json(json!({ "ok": true, "userId": address })),
    )
        .into_response())
}

/// `POST /api/auth/logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(user) = authenticate(&headers, &state).await? {
        if let Err(e) = state
            .services
            .store
            .revoke_session(user.session_id, Utc::now())
            .await
        {
            warn!(user = %user.user_id, error = %e, "Failed to revoke session");
        } else {
            info!(user = %user.user_id, sid = %user.session_id, "User signed out");
        }
    }
    Ok((
        AppendHeaders([(SET_COOKIE, clear_cookie(SESSION_COOKIE, state.cookie_options()))]),
        Json(json!({ "ok": true })),
    )
        .into_response())
}

/// `GET /api/me`
pub async fn me(user: AuthUser, State(state): State<AppState>) -> ApiResult<Response> {
    let store = &state.services.store;
    let wallet = store.wallet_for_user(&user.user_id).await?;
    let custodial = store.custodial_wallet(&user.user_id).await?;

    let body = json!({
        "userId": user.user_id,
        "walletAddress": wallet.as_ref().map(|w| w.address.clone()).unwrap_or_else(|| user.user_id.clone()),
        "custodialPublicKey": custodial.as_ref().map(|c| c.public_key.clone()),
        "lastLoginAt": wallet.and_then(|w| w.last_login_at),
        "custodialCreatedAt": custodial.map(|c| c.created_at),
    });
    Ok(([(CACHE_CONTROL, "no-store")], Json(body)).into_response())
}
