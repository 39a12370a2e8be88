//! Storage seam used by every handler.

use crate::error::StoreResult;
use crate::models::{AccountSettings, CustodialWalletRow, NewCustodialWallet, SessionRow, WalletRow};
use chrono::{DateTime, Utc};
use perpsvc_core::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

pub trait Store: Send + Sync {
    /// Upsert `users{id}` and `wallets{address, user_id, last_login_at}` for a login.
    fn record_login<'a>(&'a self, address: &'a str, at: DateTime<Utc>) -> BoxFuture<'a, StoreResult<()>>;

    /// Most recently used login wallet for a user.
    fn wallet_for_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<WalletRow>>>;

    /// Link an address to a user (creating the user if needed).
    fn upsert_wallet<'a>(&'a self, address: &'a str, user_id: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// Set the secondary address on the user's wallet rows.
    fn update_address1<'a>(&'a self, user_id: &'a str, address1: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// First custodial wallet by ascending id.
    fn custodial_wallet<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<CustodialWalletRow>>>;

    /// Insert unless the user already has one. Returns whether a row was written.
    fn insert_custodial_wallet(&self, wallet: NewCustodialWallet) -> BoxFuture<'_, StoreResult<bool>>;

    /// Persist Drift account fields that are still unset.
    fn set_drift_account<'a>(
        &'a self,
        user_id: &'a str,
        subaccount: i32,
        user_pda: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>>;

    fn account_settings<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<AccountSettings>>>;

    fn upsert_baseline<'a>(
        &'a self,
        user_id: &'a str,
        baseline_usd: f64,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<AccountSettings>>;

    fn create_session(&self, session: SessionRow) -> BoxFuture<'_, StoreResult<()>>;

    fn session(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<SessionRow>>>;

    fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<()>>;

    /// Connectivity probe for health checks.
    fn ping(&self) -> BoxFuture<'_, StoreResult<()>>;
}

/// Arc wrapper for Store trait objects.
pub type DynStore = Arc<dyn Store>;
