//! Signed session tokens.
//!
//! Token format: `base64url(claims_json) "." base64url(hmac_sha256(key, claims_b64))`.
//! The token carries a session id; the caller must also check that the
//! session row exists and is not revoked.

use crate::error::{AuthError, AuthResult};
use crate::SESSION_MAX_AGE_SECS;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Minimum HMAC key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session id (row key in the sessions table).
    pub sid: Uuid,
    /// User id (wallet address).
    pub uid: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(uid: impl Into<String>, now: i64) -> Self {
        Self {
            sid: Uuid::new_v4(),
            uid: uid.into(),
            iat: now,
            exp: now + SESSION_MAX_AGE_SECS,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.exp <= now
    }
}

/// Issues and checks session tokens with a process-held HMAC key.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> AuthResult<Self> {
        let key = key.into();
        if key.len() < MIN_KEY_LEN {
            return Err(AuthError::WeakKey(key.len()));
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(&key)
            .map_err(|_| AuthError::WeakKey(key.len()))?;
        Ok(Self { mac })
    }

    fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }

    /// Encode and sign claims.
    pub fn sign(&self, claims: &SessionClaims) -> String {
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{payload}.{tag}")
    }

    /// Verify signature (constant time) and expiry, returning the claims.
    pub fn verify(&self, token: &str, now: i64) -> AuthResult<SessionClaims> {
        let (payload, tag) = token.split_once('.').ok_or(AuthError::MalformedToken)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::MalformedToken)?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::TokenSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::MalformedToken)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| AuthError::MalformedToken)?;

        if claims.is_expired(now) {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}
