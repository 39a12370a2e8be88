//! Page navigation gate.
//!
//! API routes check their own session; page routes are redirected here:
//! signed-in users away from `/login`, everyone else towards it.

use crate::extract::authenticate;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::warn;

pub const LOGIN_PATH: &str = "/login";

const PASSTHROUGH_PREFIXES: &[&str] = &["/api", "/_next", "/public"];
const PASSTHROUGH_PATHS: &[&str] = &["/favicon.ico", "/metrics", "/health"];

pub fn is_passthrough(path: &str) -> bool {
    PASSTHROUGH_PATHS.contains(&path)
        || PASSTHROUGH_PREFIXES.iter().any(|prefix| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
}

pub async fn page_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if is_passthrough(&path) {
        return next.run(req).await;
    }

    let headers = req.headers().clone();
    let signed_in = match authenticate(&headers, &state).await {
        Ok(user) => user.is_some(),
        Err(e) => {
            warn!(error = %e, "Session lookup failed in page gate");
            false
        }
    };

    if path == LOGIN_PATH {
        if signed_in {
            return Redirect::temporary("/").into_response();
        }
        return next.run(req).await;
    }
    if !signed_in {
        return Redirect::temporary(LOGIN_PATH).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        assert!(is_passthrough("/api"));
        assert!(is_passthrough("/api/auth/nonce"));
        assert!(is_passthrough("/_next/static/chunk.js"));
        assert!(is_passthrough("/favicon.ico"));
        assert!(is_passthrough("/metrics"));
        assert!(!is_passthrough("/apiary"));
        assert!(!is_passthrough("/"));
        assert!(!is_passthrough("/login"));
        assert!(!is_passthrough("/wallet"));
    }
}
