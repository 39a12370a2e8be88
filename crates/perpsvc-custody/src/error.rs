//! Custody error types.

use perpsvc_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("invalid user id")]
    InvalidUser,

    #[error("key-encryption key invalid: {0}")]
    Kek(String),

    #[error("sealing failed: {0}")]
    Seal(String),

    #[error("unsealing failed: {0}")]
    Open(String),

    #[error("secret key decode failed: {0}")]
    KeyDecode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CustodyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUser => "invalid_user",
            Self::KeyDecode(_) | Self::Open(_) => "wallet_error",
            Self::Kek(_) | Self::Seal(_) | Self::Store(_) => "internal_error",
        }
    }
}

pub type CustodyResult<T> = Result<T, CustodyError>;
