//! Authentication error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid login payload")]
    InvalidPayload,

    #[error("nonce missing or not present in message")]
    InvalidNonce,

    #[error("signature verification failed: {0}")]
    BadSignature(String),

    #[error("malformed session token")]
    MalformedToken,

    #[error("session token signature mismatch")]
    TokenSignature,

    #[error("session expired")]
    Expired,

    #[error("session key too short: {0} bytes")]
    WeakKey(usize),
}

impl AuthError {
    /// Client-facing error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidNonce => "invalid_nonce",
            Self::BadSignature(_) => "bad_signature",
            Self::MalformedToken | Self::TokenSignature | Self::Expired => "unauthorized",
            Self::WeakKey(_) => "server_misconfigured",
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
