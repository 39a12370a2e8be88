//! Startup error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] perpsvc_telemetry::TelemetryError),

    #[error("Auth error: {0}")]
    Auth(#[from] perpsvc_auth::AuthError),

    #[error("Store error: {0}")]
    Store(#[from] perpsvc_store::StoreError),

    #[error("Custody error: {0}")]
    Custody(#[from] perpsvc_custody::CustodyError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] perpsvc_ledger::LedgerError),

    #[error("Venue client error: {0}")]
    Venue(#[from] perpsvc_venue::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
