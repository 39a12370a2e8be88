//! Per-user custodial wallet provisioning.

use crate::envelope::{Envelope, SealedSecret};
use crate::error::{CustodyError, CustodyResult};
use crate::keypair::CustodialKeypair;
use chrono::{DateTime, Utc};
use perpsvc_store::{CustodialWalletRow, DynStore, NewCustodialWallet};
use perpsvc_telemetry::Metrics;
use std::sync::Arc;
use tracing::{info, warn};

/// User ids shorter than this are rejected.
pub const MIN_USER_ID_LEN: usize = 6;

/// Result of `ensure_wallet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredWallet {
    pub public_key: String,
    pub existed: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored wallet with its unsealed keypair.
#[derive(Debug, Clone)]
pub struct CustodialAccount {
    pub row: CustodialWalletRow,
    pub keypair: CustodialKeypair,
}

#[derive(Clone)]
pub struct WalletProvisioner {
    store: DynStore,
    envelope: Arc<Envelope>,
}

impl WalletProvisioner {
    pub fn new(store: DynStore, envelope: Arc<Envelope>) -> Self {
        Self { store, envelope }
    }

    /// Return the user's wallet, creating it on first call.
    ///
    /// Racing first calls converge on the same row: the insert is a no-op
    /// when one already exists and the result is always re-read.
    pub async fn ensure_wallet(&self, user_id: &str) -> CustodyResult<EnsuredWallet> {
        if user_id.len() < MIN_USER_ID_LEN {
            return Err(CustodyError::InvalidUser);
        }

        if let Some(row) = self.store.custodial_wallet(user_id).await? {
            Metrics::wallet_provisioned(true);
            return Ok(EnsuredWallet {
                public_key: row.public_key,
                existed: true,
                created_at: row.created_at,
            });
        }

        let keypair = CustodialKeypair::generate();
        let sealed = self.envelope.seal(&keypair.secret_bytes()[..])?;
        let public_key = keypair.public_key_b58();

        let inserted = self
            .store
            .insert_custodial_wallet(NewCustodialWallet {
                user_id: user_id.to_string(),
                public_key: public_key.clone(),
                secret_sealed: sealed.ciphertext_b64,
                wrapped_key: sealed.wrapped_key_b64,
                created_at: Utc::now(),
            })
            .await?;

        let row = self
            .store
            .custodial_wallet(user_id)
            .await?
            .ok_or_else(|| perpsvc_store::StoreError::NotFound(format!("custodial wallet for {user_id}")))?;

        let existed = !inserted || row.public_key != public_key;
        if existed {
            warn!(user = %user_id, "Lost custodial wallet insert race, using existing row");
        } else {
            info!(user = %user_id, public_key = %row.public_key, "Created custodial wallet");
        }
        Metrics::wallet_provisioned(existed);

        Ok(EnsuredWallet {
            public_key: row.public_key,
            existed,
            created_at: row.created_at,
        })
    }

    /// Stored row only, without touching the secret.
    pub async fn wallet(&self, user_id: &str) -> CustodyResult<Option<CustodialWalletRow>> {
        Ok(self.store.custodial_wallet(user_id).await?)
    }

    /// Load and unseal the user's keypair.
    pub async fn load(&self, user_id: &str) -> CustodyResult<Option<CustodialAccount>> {
        let Some(row) = self.store.custodial_wallet(user_id).await? else {
            return Ok(None);
        };
        let keypair = self.unseal(&row)?;
        Ok(Some(CustodialAccount { row, keypair }))
    }

    fn unseal(&self, row: &CustodialWalletRow) -> CustodyResult<CustodialKeypair> {
        // Rows written before envelope encryption hold the raw secret and no wrapped key.
        if row.wrapped_key.is_empty() {
            return CustodialKeypair::decode_secret(&row.secret_sealed);
        }

        let secret = self.envelope.open(&SealedSecret {
            ciphertext_b64: row.secret_sealed.clone(),
            wrapped_key_b64: row.wrapped_key.clone(),
        })?;
        let keypair = CustodialKeypair::from_secret_bytes(&secret)?;

        if keypair.public_key_b58() != row.public_key {
            return Err(CustodyError::KeyDecode(
                "unsealed secret does not match stored public key".to_string(),
            ));
        }
        Ok(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsvc_store::{MemoryStore, Store};

    fn provisioner() -> (Arc<MemoryStore>, WalletProvisioner) {
        let store = Arc::new(MemoryStore::new());
        let envelope = Arc::new(Envelope::from_key([11u8; 32]));
        (store.clone(), WalletProvisioner::new(store, envelope))
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (store, p) = provisioner();
        let first = p.ensure_wallet("wallet-user-1").await.unwrap();
        let second = p.ensure_wallet("wallet-user-1").await.unwrap();

        assert!(!first.existed);
        assert!(second.existed);
        assert_eq!(first.public_key, second.public_key);
        assert_eq!(store.custodial_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_agree() {
        let (store, p) = provisioner();
        let (a, b) = tokio::join!(p.ensure_wallet("racer-123"), p.ensure_wallet("racer-123"));
        assert_eq!(a.unwrap().public_key, b.unwrap().public_key);
        assert_eq!(store.custodial_count(), 1);
    }

    #[tokio::test]
    async fn test_short_user_id_rejected() {
        let (_, p) = provisioner();
        let err = p.ensure_wallet("abc").await.unwrap_err();
        assert_eq!(err.code(), "invalid_user");
    }

    #[tokio::test]
    async fn test_load_round_trips_through_envelope() {
        let (store, p) = provisioner();
        let ensured = p.ensure_wallet("wallet-user-2").await.unwrap();

        let row = store.custodial_wallet("wallet-user-2").await.unwrap().unwrap();
        assert!(!row.secret_sealed.contains(&ensured.public_key));
        assert!(!row.wrapped_key.is_empty());

        let account = p.load("wallet-user-2").await.unwrap().unwrap();
        assert_eq!(account.keypair.public_key_b58(), ensured.public_key);
    }

    #[tokio::test]
    async fn test_load_legacy_plaintext_row() {
        let (store, p) = provisioner();
        let kp = CustodialKeypair::from_seed(&[4u8; 32]);
        store.put_custodial(CustodialWalletRow {
            id: 1,
            user_id: "legacy-user".to_string(),
            public_key: kp.public_key_b58(),
            secret_sealed: kp.secret_key_b64().to_string(),
            wrapped_key: String::new(),
            drift_subaccount: None,
            drift_user_pda: None,
            created_at: Utc::now(),
        });

        let account = p.load("legacy-user").await.unwrap().unwrap();
        assert_eq!(account.keypair.public_key_b58(), kp.public_key_b58());
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let (_, p) = provisioner();
        assert!(p.load("nobody-here").await.unwrap().is_none());
    }
}
