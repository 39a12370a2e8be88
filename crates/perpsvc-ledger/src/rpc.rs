//! Solana RPC seam.

use crate::error::{LedgerError, LedgerResult};
use parking_lot::Mutex;
use perpsvc_core::BoxFuture;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::HashMap;
use std::sync::Arc;

/// Confirmation state of a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    /// `confirmed` or `finalized`.
    pub confirmed: bool,
    /// Execution error, if the transaction failed.
    pub err: Option<String>,
}

/// Balance-relevant slice of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionMeta {
    pub block_time: Option<i64>,
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

/// Signature with its block time as listed by `getSignaturesForAddress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub block_time: Option<i64>,
}

pub trait SolanaRpc: Send + Sync {
    fn get_balance(&self, key: Pubkey) -> BoxFuture<'_, LedgerResult<u64>>;

    /// Sum of raw token amounts over the owner's accounts for `mint`.
    fn get_token_balance(&self, owner: Pubkey, mint: Pubkey) -> BoxFuture<'_, LedgerResult<u64>>;

    fn get_latest_blockhash(&self) -> BoxFuture<'_, LedgerResult<Hash>>;

    /// Network fee for a message; `None` when the blockhash expired.
    fn get_fee_for_message(&self, message: Message) -> BoxFuture<'_, LedgerResult<Option<u64>>>;

    /// Submit a signed transaction, returning its signature.
    fn send_transaction(&self, tx: VersionedTransaction) -> BoxFuture<'_, LedgerResult<String>>;

    fn get_signature_status<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, LedgerResult<Option<SignatureStatus>>>;

    fn get_signatures_for_address(&self, key: Pubkey, limit: usize) -> BoxFuture<'_, LedgerResult<Vec<SignatureInfo>>>;

    fn get_transaction<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, LedgerResult<Option<TransactionMeta>>>;
}

/// Arc wrapper for SolanaRpc trait objects.
pub type DynSolanaRpc = Arc<dyn SolanaRpc>;

/// In-memory RPC for tests and offline runs.
#[derive(Debug, Default)]
pub struct FakeRpc {
    balances: Mutex<HashMap<Pubkey, u64>>,
    token_balances: Mutex<HashMap<(Pubkey, Pubkey), u64>>,
    fee: Mutex<Option<u64>>,
    sent: Mutex<Vec<VersionedTransaction>>,
    fail_sends: Mutex<Option<String>>,
    signatures: Mutex<HashMap<Pubkey, Vec<SignatureInfo>>>,
    transactions: Mutex<HashMap<String, TransactionMeta>>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self {
            fee: Mutex::new(Some(5000)),
            ..Default::default()
        }
    }

    pub fn set_balance(&self, key: Pubkey, lamports: u64) {
        self.balances.lock().insert(key, lamports);
    }

    pub fn set_token_balance(&self, owner: Pubkey, mint: Pubkey, amount: u64) {
        self.token_balances.lock().insert((owner, mint), amount);
    }

    pub fn set_fee(&self, fee: Option<u64>) {
        *self.fee.lock() = fee;
    }

    pub fn fail_sends_with(&self, message: impl Into<String>) {
        *self.fail_sends.lock() = Some(message.into());
    }

    pub fn add_transaction(&self, key: Pubkey, signature: &str, meta: TransactionMeta) {
        self.signatures.lock().entry(key).or_default().push(SignatureInfo {
            signature: signature.to_string(),
            block_time: meta.block_time,
        });
        self.transactions.lock().insert(signature.to_string(), meta);
    }

    /// Transactions submitted so far.
    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().clone()
    }
}

impl SolanaRpc for FakeRpc {
    fn get_balance(&self, key: Pubkey) -> BoxFuture<'_, LedgerResult<u64>> {
        Box::pin(async move { Ok(self.balances.lock().get(&key).copied().unwrap_or(0)) })
    }

    fn get_token_balance(&self, owner: Pubkey, mint: Pubkey) -> BoxFuture<'_, LedgerResult<u64>> {
        Box::pin(async move {
            Ok(self
                .token_balances
                .lock()
                .get(&(owner, mint))
                .copied()
                .unwrap_or(0))
        })
    }

    fn get_latest_blockhash(&self) -> BoxFuture<'_, LedgerResult<Hash>> {
        Box::pin(async { Ok(Hash::new_from_array([7u8; 32])) })
    }

    fn get_fee_for_message(&self, _message: Message) -> BoxFuture<'_, LedgerResult<Option<u64>>> {
        Box::pin(async move { Ok(*self.fee.lock()) })
    }

    fn send_transaction(&self, tx: VersionedTransaction) -> BoxFuture<'_, LedgerResult<String>> {
        Box::pin(async move {
            if let Some(message) = self.fail_sends.lock().clone() {
                return Err(LedgerError::Rpc { code: -32002, message });
            }
            let signature = tx
                .signatures
                .first()
                .map(ToString::to_string)
                .ok_or_else(|| LedgerError::Decode("transaction has no signatures".to_string()))?;
            self.sent.lock().push(tx);
            Ok(signature)
        })
    }

    fn get_signature_status<'a>(&'a self, _signature: &'a str) -> BoxFuture<'a, LedgerResult<Option<SignatureStatus>>> {
        Box::pin(async {
            Ok(Some(SignatureStatus {
                confirmed: true,
                err: None,
            }))
        })
    }

    fn get_signatures_for_address(&self, key: Pubkey, limit: usize) -> BoxFuture<'_, LedgerResult<Vec<SignatureInfo>>> {
        Box::pin(async move {
            let sigs = self.signatures.lock().get(&key).cloned().unwrap_or_default();
            Ok(sigs.into_iter().rev().take(limit).collect())
        })
    }

    fn get_transaction<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, LedgerResult<Option<TransactionMeta>>> {
        Box::pin(async move { Ok(self.transactions.lock().get(signature).cloned()) })
    }
}
