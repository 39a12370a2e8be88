//! Request extractors: the authenticated user and JSON bodies.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use perpsvc_auth::{read_cookie, SESSION_COOKIE};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

/// A user with a live, signed session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub session_id: Uuid,
}

/// Value of cookie `name` across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|header| read_cookie(header, name).map(str::to_string))
}

/// Resolve the session cookie. `Ok(None)` means "not signed in".
pub async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<Option<AuthUser>, ApiError> {
    let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
        return Ok(None);
    };
    let now = Utc::now();
    let claims = match state.services.sessions.verify(&token, now.timestamp()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Rejected session token");
            return Ok(None);
        }
    };

    let row = state.services.store.session(claims.sid).await?;
    match row {
        Some(row) if row.is_live(now) && row.user_id == claims.uid => Ok(Some(AuthUser {
            user_id: claims.uid,
            session_id: claims.sid,
        })),
        _ => {
            debug!(sid = %claims.sid, "Session revoked or unknown");
            Ok(None)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state)
            .await?
            .ok_or_else(ApiError::unauthorized)
    }
}

/// JSON body whose parse failures render as `{"error": "invalid_json"}`.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::bad_request("invalid_json"))?;
        parse_json(&bytes).map(JsonBody)
    }
}

/// Parse a body; an empty body reads as `{}`.
pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes
    };
    serde_json::from_slice(bytes).map_err(|e| {
        debug!(error = %e, "Malformed JSON body");
        ApiError::bad_request("invalid_json")
    })
}
