//! API error responses.
//!
//! Every failure leaves the server as `{"error": <code>, ...}` with a
//! status chosen here, never by the domain crates.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use perpsvc_auth::AuthError;
use perpsvc_core::{OrderValidationError, VenueErrorKind};
use perpsvc_custody::CustodyError;
use perpsvc_ledger::LedgerError;
use perpsvc_market::MarketError;
use perpsvc_store::StoreError;
use perpsvc_venue::ClientError;
use serde_json::{Map, Value};
use std::borrow::Cow;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
#[error("{status}: {code}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Cow<'static, str>,
    pub fields: Map<String, Value>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            code: code.into(),
            fields: Map::new(),
        }
    }

    pub fn bad_request(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found")
    }

    pub fn internal(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code)
    }

    /// Extra top-level field next to `error`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_details(self, details: impl Into<String>) -> Self {
        self.with("details", details.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::with_capacity(self.fields.len() + 1);
        body.insert("error".to_string(), Value::String(self.code.into_owned()));
        body.extend(self.fields);
        (self.status, Json(Value::Object(body))).into_response()
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let status = match &e {
            AuthError::InvalidPayload | AuthError::InvalidNonce => StatusCode::BAD_REQUEST,
            AuthError::BadSignature(_)
            | AuthError::MalformedToken
            | AuthError::TokenSignature
            | AuthError::Expired => StatusCode::UNAUTHORIZED,
            AuthError::WeakKey(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.code())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "Store operation failed");
        Self::internal("database_error")
    }
}

impl From<CustodyError> for ApiError {
    fn from(e: CustodyError) -> Self {
        match e {
            CustodyError::InvalidUser => Self::bad_request(e.code()),
            CustodyError::KeyDecode(_) | CustodyError::Open(_) => {
                error!(error = %e, "Custodial key could not be opened");
                Self::bad_request(e.code())
            }
            CustodyError::Store(inner) => inner.into(),
            CustodyError::Kek(_) | CustodyError::Seal(_) => {
                error!(error = %e, "Custody failure");
                Self::internal(e.code())
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match &e {
            LedgerError::InvalidAddress(_) => Self::bad_request(e.code()),
            LedgerError::InsufficientFunds { balance } => {
                Self::bad_request(e.code()).with("balanceLamports", *balance)
            }
            LedgerError::MissingConfig(code) => Self::internal(*code),
            LedgerError::Upstream {
                service: "helius",
                status,
                ..
            } => Self::internal(format!("helius_{status}")),
            LedgerError::Upstream { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, e.code()).with_details(e.to_string())
            }
            LedgerError::NotConfirmed(_)
            | LedgerError::TransactionFailed { .. }
            | LedgerError::Signing(_) => Self::internal(e.code()).with_details(e.to_string()),
            LedgerError::Rpc { .. }
            | LedgerError::Client(_)
            | LedgerError::Http(_)
            | LedgerError::Decode(_) => {
                error!(error = %e, "Solana RPC failure");
                Self::new(StatusCode::BAD_GATEWAY, e.code())
            }
        }
    }
}

impl From<OrderValidationError> for ApiError {
    fn from(e: OrderValidationError) -> Self {
        Self::bad_request(e.code())
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidOrder(v) => v.into(),
            ClientError::Ledger(inner @ LedgerError::InvalidAddress(_)) => inner.into(),
            other => {
                let venue = other.to_venue_error();
                let err = Self::new(status(venue.kind.status()), venue.kind.code());
                match venue.kind {
                    VenueErrorKind::Rejected | VenueErrorKind::Transport => {
                        err.with_details(venue.message)
                    }
                    _ => err,
                }
            }
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        match e {
            MarketError::InvalidTimeframe(_) => Self::bad_request("invalid_timeframe"),
            MarketError::Upstream(inner) => inner.into(),
            other => Self::new(StatusCode::BAD_GATEWAY, "upstream_error").with_details(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_body_shape() {
        let (status, body) = body_of(
            ApiError::bad_request("insufficient_funds").with("balanceLamports", 42u64),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insufficient_funds");
        assert_eq!(body["balanceLamports"], 42);
    }

    #[test]
    fn test_auth_statuses() {
        assert_eq!(ApiError::from(AuthError::InvalidNonce).status, StatusCode::BAD_REQUEST);
        let err = ApiError::from(AuthError::BadSignature("x".to_string()));
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, "bad_signature");
    }

    #[test]
    fn test_helius_status_code() {
        let err = ApiError::from(LedgerError::Upstream {
            service: "helius",
            status: 401,
            body: String::new(),
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "helius_401");
    }

    #[test]
    fn test_venue_errors() {
        let err = ApiError::from(ClientError::Rejected("Slippage tolerance exceeded".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "slippage_error");
        assert!(err.fields.is_empty());

        let err = ApiError::from(ClientError::Rejected("market paused".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "order_placement_failed");
        assert_eq!(err.fields["details"], "market paused");

        let err = ApiError::from(ClientError::InvalidOrder(OrderValidationError::InvalidOrderSize));
        assert_eq!(err.code, "invalid_order_size");
    }
}
