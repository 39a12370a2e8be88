//! Ledger error types.

use solana_client::client_error::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC client error: {0}")]
    Client(Box<ClientError>),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient funds: balance {balance} lamports")]
    InsufficientFunds { balance: u64 },

    #[error("Transaction {0} not confirmed in time")]
    NotConfirmed(String),

    #[error("Transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },

    /// Carries its own client-facing code (e.g. `missing_helius_api_key`).
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_destination",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::NotConfirmed(_) => "confirmation_timeout",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::MissingConfig(code) => code,
            Self::Upstream { .. } => "upstream_error",
            Self::Signing(_) => "signing_error",
            Self::Rpc { .. } | Self::Client(_) | Self::Http(_) | Self::Decode(_) => "rpc_error",
        }
    }
}

impl From<ClientError> for LedgerError {
    fn from(err: ClientError) -> Self {
        Self::Client(Box::new(err))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
