//! Ed25519 login challenge verification.

use crate::error::{AuthError, AuthResult};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::Value;

/// A signed login message posted by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    /// Base58 wallet public key.
    pub address: String,
    /// Base58 detached signature.
    pub signature: String,
    /// The message that was signed; must contain the nonce.
    pub message: String,
}

impl LoginChallenge {
    /// Extract the challenge from a raw JSON body.
    ///
    /// Each field must be present and a JSON string.
    pub fn from_json(body: &Value) -> AuthResult<Self> {
        let field = |name: &str| -> AuthResult<String> {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(AuthError::InvalidPayload)
        };

        Ok(Self {
            address: field("address")?,
            signature: field("signature")?,
            message: field("message")?,
        })
    }

    /// Check the nonce cookie against the message, then the signature.
    pub fn verify(&self, nonce_cookie: Option<&str>) -> AuthResult<()> {
        match nonce_cookie {
            Some(nonce) if !nonce.is_empty() && self.message.contains(nonce) => {}
            _ => return Err(AuthError::InvalidNonce),
        }
        self.verify_signature()
    }

    /// Ed25519 verification over the UTF-8 bytes of the message.
    pub fn verify_signature(&self) -> AuthResult<()> {
        let key_bytes: [u8; 32] = decode_fixed(&self.address, "public key")?;
        let sig_bytes: [u8; 64] = decode_fixed(&self.signature, "signature")?;

        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| AuthError::BadSignature(e.to_string()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(self.message.as_bytes(), &signature)
            .map_err(|e| AuthError::BadSignature(e.to_string()))
    }
}

fn decode_fixed<const N: usize>(b58: &str, what: &str) -> AuthResult<[u8; N]> {
    let bytes = bs58::decode(b58)
        .into_vec()
        .map_err(|e| AuthError::BadSignature(format!("{what}: {e}")))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| AuthError::BadSignature(format!("{what}: expected {N} bytes, got {len}")))
}
