//! Custodial Ed25519 keypairs.

use crate::error::{CustodyError, CustodyResult};
use alloy::signers::local::PrivateKeySigner;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use solana_sdk::signature::Keypair;
use zeroize::Zeroizing;

/// Length of the exported secret: seed (32) followed by public key (32).
pub const SECRET_LEN: usize = 64;

/// A user's custodial signing key.
#[derive(Clone)]
pub struct CustodialKeypair {
    signing: SigningKey,
}

impl std::fmt::Debug for CustodialKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialKeypair")
            .field("public_key", &self.public_key_b58())
            .finish_non_exhaustive()
    }
}

impl CustodialKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut seed[..]);
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild from a 64-byte secret (only the first 32 bytes are used).
    pub fn from_secret_bytes(bytes: &[u8]) -> CustodyResult<Self> {
        if bytes.len() < SECRET_LEN {
            return Err(CustodyError::KeyDecode(format!(
                "expected at least {SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&bytes[..32]);
        Ok(Self::from_seed(&seed))
    }

    /// Decode a stored secret in any historic encoding:
    /// JSON byte array, base64, or base58.
    pub fn decode_secret(encoded: &str) -> CustodyResult<Self> {
        let trimmed = encoded.trim();

        if trimmed.starts_with('[') {
            let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
                serde_json::from_str(trimmed)
                    .map_err(|e| CustodyError::KeyDecode(format!("json array: {e}")))?,
            );
            return Self::from_secret_bytes(&bytes);
        }

        // A padded base64 secret always carries '=', which base58 never does.
        if trimmed.contains(|c| matches!(c, '=' | '+' | '/')) {
            let bytes = Zeroizing::new(
                BASE64_STANDARD
                    .decode(trimmed)
                    .map_err(|e| CustodyError::KeyDecode(format!("base64: {e}")))?,
            );
            return Self::from_secret_bytes(&bytes);
        }

        match bs58::decode(trimmed).into_vec() {
            Ok(bytes) => Self::from_secret_bytes(&Zeroizing::new(bytes)),
            Err(b58_err) => {
                let bytes = Zeroizing::new(BASE64_STANDARD.decode(trimmed).map_err(|_| {
                    CustodyError::KeyDecode(format!("not base64 or base58: {b58_err}"))
                })?);
                Self::from_secret_bytes(&bytes)
            }
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn public_key_b58(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }

    /// Seed followed by public key.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_LEN]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    pub fn secret_key_b64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64_STANDARD.encode(&self.secret_bytes()[..]))
    }

    pub fn secret_key_b58(&self) -> Zeroizing<String> {
        Zeroizing::new(bs58::encode(&self.secret_bytes()[..]).into_string())
    }

    /// Detached Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// The same key as a Solana transaction signer.
    pub fn solana_keypair(&self) -> Keypair {
        Keypair::new_from_array(self.signing.to_bytes())
    }

    /// secp256k1 signer for EVM-style venues, keyed by the same 32-byte seed.
    pub fn evm_signer(&self) -> CustodyResult<PrivateKeySigner> {
        let seed = Zeroizing::new(self.signing.to_bytes());
        PrivateKeySigner::from_slice(&seed[..])
            .map_err(|e| CustodyError::KeyDecode(format!("evm key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    #[test]
    fn test_secret_layout() {
        let kp = CustodialKeypair::from_seed(&[9u8; 32]);
        let secret = kp.secret_bytes();
        assert_eq!(&secret[..32], &[9u8; 32]);
        assert_eq!(&secret[32..], &kp.public_key_bytes());
    }

    #[test]
    fn test_decode_all_formats() {
        let kp = CustodialKeypair::generate();
        let secret = kp.secret_bytes();
        let json = serde_json::to_string(&secret.to_vec()).unwrap();

        for encoded in [
            json,
            kp.secret_key_b64().to_string(),
            kp.secret_key_b58().to_string(),
        ] {
            let decoded = CustodialKeypair::decode_secret(&encoded).unwrap();
            assert_eq!(decoded.public_key_b58(), kp.public_key_b58());
        }
    }

    #[test]
    fn test_decode_rejects_short_secret() {
        let short = BASE64_STANDARD.encode([1u8; 32]);
        assert!(matches!(
            CustodialKeypair::decode_secret(&short),
            Err(CustodyError::KeyDecode(_))
        ));
        assert!(CustodialKeypair::decode_secret("[1,2,3]").is_err());
    }

    #[test]
    fn test_signature_verifies() {
        let kp = CustodialKeypair::generate();
        let sig = kp.sign(b"transfer");
        let key = VerifyingKey::from_bytes(&kp.public_key_bytes()).unwrap();
        assert!(key
            .verify(b"transfer", &Signature::from_bytes(&sig))
            .is_ok());
    }

    #[test]
    fn test_solana_keypair_shares_key() {
        use solana_sdk::signature::Signer;

        let kp = CustodialKeypair::from_seed(&[11u8; 32]);
        let solana = kp.solana_keypair();
        assert_eq!(solana.pubkey().to_bytes(), kp.public_key_bytes());
        assert_eq!(solana.sign_message(b"transfer").as_ref(), &kp.sign(b"transfer")[..]);
    }

    #[test]
    fn test_evm_signer_is_deterministic() {
        let kp = CustodialKeypair::from_seed(&[3u8; 32]);
        let a = kp.evm_signer().unwrap().address();
        let b = kp.evm_signer().unwrap().address();
        assert_eq!(a, b);
    }
}
