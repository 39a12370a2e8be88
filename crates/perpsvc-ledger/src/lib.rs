//! Solana wallet ledger for custodial accounts.
//!
//! - `SolanaRpc`: RPC seam (`solana-client` + in-memory fake)
//! - `tx`: transfer building and versioned-transaction signing
//! - `fee`: safety-margined fees and bounded max-withdraw convergence
//! - `history` / `helius`: deposit and withdraw history
//! - `WalletLedger`: the operations the wallet endpoints call

pub mod client;
pub mod error;
pub mod fee;
pub mod helius;
pub mod history;
pub mod pubkey;
pub mod rpc;
pub mod service;
pub mod tx;

pub use client::RpcClient;
pub use error::{LedgerError, LedgerResult};
pub use fee::{safe_fee, FeeConvergence, MaxWithdraw};
pub use helius::{
    parse_activity, ActivityApi, ActivityEntry, ActivityKind, DynActivityApi, FakeActivity,
    HeliusClient, ACTIVITY_LIMIT,
};
pub use history::{HistoryEntry, HistoryKind};
pub use pubkey::{parse_pubkey, Pubkey};
pub use rpc::{DynSolanaRpc, FakeRpc, SignatureInfo, SignatureStatus, SolanaRpc, TransactionMeta};
pub use service::{Balance, WalletLedger};
