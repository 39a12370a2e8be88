//! Adapter error types.
//!
//! Transport-level failures stay in `ClientError`; anything surfaced to a
//! handler goes through `to_venue_error`, which is the single place
//! upstream messages are classified.

use perpsvc_core::{OrderValidationError, VenueError, VenueErrorKind};
use perpsvc_custody::CustodyError;
use perpsvc_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    /// The venue answered but refused the request.
    #[error("{0}")]
    Rejected(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error(transparent)]
    InvalidOrder(#[from] OrderValidationError),

    #[error(transparent)]
    Wallet(#[from] CustodyError),

    /// Signing or submitting a venue-built transaction on Solana.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ClientError {
    /// Upstream HTTP status, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn to_venue_error(&self) -> VenueError {
        let message = self.to_string();
        let kind = match self {
            Self::Http(msg) => match VenueErrorKind::classify(msg) {
                VenueErrorKind::Rejected => VenueErrorKind::Connection,
                kind => kind,
            },
            Self::Status { status: 429, .. } => VenueErrorKind::RateLimited,
            Self::Status { body, .. } => VenueErrorKind::classify(body),
            Self::Decode(_) => VenueErrorKind::Transport,
            Self::Signing(_) | Self::Wallet(_) => VenueErrorKind::Wallet,
            Self::Rejected(msg) => VenueErrorKind::classify(msg),
            Self::UnknownMarket(_) | Self::InvalidOrder(_) => VenueErrorKind::Rejected,
            Self::Ledger(LedgerError::InsufficientFunds { .. }) => VenueErrorKind::InsufficientFunds,
            Self::Ledger(LedgerError::Http(_)) => VenueErrorKind::Connection,
            Self::Ledger(LedgerError::Decode(_)) => VenueErrorKind::Transport,
            Self::Ledger(LedgerError::Signing(_)) => VenueErrorKind::Wallet,
            Self::Ledger(e) => VenueErrorKind::classify(&e.to_string()),
        };
        VenueError::new(kind, message)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_status() {
        let err = ClientError::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.to_venue_error().kind, VenueErrorKind::RateLimited);
    }

    #[test]
    fn test_transport_failures_are_connection_errors() {
        let err = ClientError::Http("error sending request: dns failure".to_string());
        assert_eq!(err.to_venue_error().kind, VenueErrorKind::Connection);
    }

    #[test]
    fn test_rejection_is_classified() {
        let err = ClientError::Rejected("Insufficient margin to place order.".to_string());
        assert_eq!(err.to_venue_error().kind, VenueErrorKind::InsufficientFunds);

        let err = ClientError::Rejected("Order has invalid size.".to_string());
        let venue = err.to_venue_error();
        assert_eq!(venue.kind, VenueErrorKind::Rejected);
        assert_eq!(venue.message, "Order has invalid size.");
    }

    #[test]
    fn test_wallet_errors() {
        let err = ClientError::Wallet(CustodyError::KeyDecode("bad".to_string()));
        assert_eq!(err.to_venue_error().kind, VenueErrorKind::Wallet);
    }
}
