//! Envelope encryption for custodial secrets.
//!
//! Each secret is sealed with its own random data key (DEK); the DEK is
//! sealed with the key-encryption key (KEK). Both use ChaCha20-Poly1305
//! with a random 12-byte nonce prefixed to the ciphertext, base64 encoded.

use crate::error::{CustodyError, CustodyResult};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit as _, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// A sealed secret and its wrapped data key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext_b64: String,
    pub wrapped_key_b64: String,
}

/// Holds the KEK in process memory.
pub struct Envelope {
    kek: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").finish_non_exhaustive()
    }
}

impl Envelope {
    pub fn from_key(kek: [u8; KEY_LEN]) -> Self {
        Self {
            kek: Zeroizing::new(kek),
        }
    }

    /// Base64 of exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> CustodyResult<Self> {
        let bytes = Zeroizing::new(
            BASE64_STANDARD
                .decode(encoded.trim())
                .map_err(|e| CustodyError::Kek(e.to_string()))?,
        );
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CustodyError::Kek(format!("expected {KEY_LEN} bytes, got {}", bytes.len())))?;
        Ok(Self::from_key(key))
    }

    /// SHA-256 of a passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        Self::from_key(hasher.finalize().into())
    }

    /// Base64 32-byte key if it parses as one, otherwise a passphrase.
    pub fn from_config(value: &str) -> CustodyResult<Self> {
        if value.trim().is_empty() {
            return Err(CustodyError::Kek("empty key".to_string()));
        }
        Ok(Self::from_base64(value).unwrap_or_else(|_| Self::from_passphrase(value)))
    }

    pub fn seal(&self, plaintext: &[u8]) -> CustodyResult<SealedSecret> {
        let mut dek = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut dek[..]);

        let ciphertext = seal_with(&dek, plaintext)?;
        let wrapped = seal_with(&self.kek, &dek[..])?;

        Ok(SealedSecret {
            ciphertext_b64: BASE64_STANDARD.encode(ciphertext),
            wrapped_key_b64: BASE64_STANDARD.encode(wrapped),
        })
    }

    pub fn open(&self, sealed: &SealedSecret) -> CustodyResult<Zeroizing<Vec<u8>>> {
        let wrapped = decode(&sealed.wrapped_key_b64)?;
        let dek = open_with(&self.kek, &wrapped)?;
        let dek: Zeroizing<[u8; KEY_LEN]> = Zeroizing::new(
            dek.as_slice()
                .try_into()
                .map_err(|_| CustodyError::Open("data key has wrong length".to_string()))?,
        );

        let ciphertext = decode(&sealed.ciphertext_b64)?;
        open_with(&dek, &ciphertext)
    }
}

fn cipher(key: &[u8; KEY_LEN]) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key))
}

fn seal_with(key: &[u8; KEY_LEN], plaintext: &[u8]) -> CustodyResult<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let mut ciphertext = cipher(key)
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CustodyError::Seal(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.append(&mut ciphertext);
    Ok(combined)
}

fn open_with(key: &[u8; KEY_LEN], data: &[u8]) -> CustodyResult<Zeroizing<Vec<u8>>> {
    if data.len() < NONCE_LEN {
        return Err(CustodyError::Open("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    cipher(key)
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CustodyError::Open("authentication failed; check the custody key".to_string()))
}

fn decode(b64: &str) -> CustodyResult<Vec<u8>> {
    BASE64_STANDARD
        .decode(b64)
        .map_err(|e| CustodyError::Open(format!("base64: {e}")))
}
