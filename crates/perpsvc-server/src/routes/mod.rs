//! `/api` handlers grouped by area.

pub mod account;
pub mod auth;
pub mod exchange;
pub mod market;
pub mod trading;
pub mod wallet;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use perpsvc_custody::CustodialAccount;
use perpsvc_ledger::Pubkey;
use perpsvc_store::CustodialWalletRow;

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn wallet_pubkey(row: &CustodialWalletRow) -> ApiResult<Pubkey> {
    row.public_key
        .parse()
        .map_err(|_| ApiError::bad_request("wallet_error"))
}

/// The user's custodial keypair, or `no_custodial_wallet`.
pub(crate) async fn custodial_account(state: &AppState, user_id: &str) -> ApiResult<CustodialAccount> {
    state
        .services
        .wallets
        .load(user_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("no_custodial_wallet"))
}
