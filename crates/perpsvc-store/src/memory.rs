//! In-memory store for tests and database-less local runs.

use crate::error::StoreResult;
use crate::models::{AccountSettings, CustodialWalletRow, NewCustodialWallet, SessionRow, WalletRow};
use crate::store::Store;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use perpsvc_core::BoxFuture;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashSet<String>,
    wallets: BTreeMap<String, WalletRow>,
    custodial: Vec<CustodialWalletRow>,
    next_custodial_id: i64,
    settings: HashMap<String, AccountSettings>,
    sessions: HashMap<Uuid, SessionRow>,
}

/// Mirrors the Postgres constraints (unique custodial wallet per user).
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().users.len()
    }

    pub fn custodial_count(&self) -> usize {
        self.tables.lock().custodial.len()
    }

    /// Seed a custodial row directly (tests).
    pub fn put_custodial(&self, row: CustodialWalletRow) {
        let mut t = self.tables.lock();
        t.next_custodial_id = t.next_custodial_id.max(row.id);
        t.custodial.push(row);
    }
}

impl Store for MemoryStore {
    fn record_login<'a>(&'a self, address: &'a str, at: DateTime<Utc>) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut t = self.tables.lock();
            t.users.insert(address.to_string());
            let row = t
                .wallets
                .entry(address.to_string())
                .or_insert_with(|| WalletRow {
                    address: address.to_string(),
                    user_id: address.to_string(),
                    last_login_at: None,
                    address_1: None,
                });
            row.last_login_at = Some(at);
            Ok(())
        })
    }

    fn wallet_for_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<WalletRow>>> {
        Box::pin(async move {
            let t = self.tables.lock();
            Ok(t.wallets
                .values()
                .filter(|w| w.user_id == user_id)
                .max_by_key(|w| w.last_login_at)
                .cloned())
        })
    }

    fn upsert_wallet<'a>(&'a self, address: &'a str, user_id: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut t = self.tables.lock();
            t.users.insert(user_id.to_string());
            let row = t
                .wallets
                .entry(address.to_string())
                .or_insert_with(|| WalletRow {
                    address: address.to_string(),
                    user_id: user_id.to_string(),
                    last_login_at: None,
                    address_1: None,
                });
            row.user_id = user_id.to_string();
            Ok(())
        })
    }

    fn update_address1<'a>(&'a self, user_id: &'a str, address1: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut t = self.tables.lock();
            for w in t.wallets.values_mut().filter(|w| w.user_id == user_id) {
                w.address_1 = Some(address1.to_string());
            }
            Ok(())
        })
    }

    fn custodial_wallet<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<CustodialWalletRow>>> {
        Box::pin(async move {
            let t = self.tables.lock();
            Ok(t.custodial
                .iter()
                .filter(|w| w.user_id == user_id)
                .min_by_key(|w| w.id)
                .cloned())
        })
    }

    fn insert_custodial_wallet(&self, wallet: NewCustodialWallet) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let mut t = self.tables.lock();
            if t.custodial.iter().any(|w| w.user_id == wallet.user_id) {
                return Ok(false);
            }
            t.next_custodial_id += 1;
            let id = t.next_custodial_id;
            t.custodial.push(CustodialWalletRow {
                id,
                user_id: wallet.user_id,
                public_key: wallet.public_key,
                secret_sealed: wallet.secret_sealed,
                wrapped_key: wallet.wrapped_key,
                drift_subaccount: None,
                drift_user_pda: None,
                created_at: wallet.created_at,
            });
            Ok(true)
        })
    }

    fn set_drift_account<'a>(
        &'a self,
        user_id: &'a str,
        subaccount: i32,
        user_pda: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut t = self.tables.lock();
            for w in t.custodial.iter_mut().filter(|w| w.user_id == user_id) {
                w.drift_subaccount.get_or_insert(subaccount);
                w.drift_user_pda.get_or_insert_with(|| user_pda.to_string());
            }
            Ok(())
        })
    }

    fn account_settings<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<AccountSettings>>> {
        Box::pin(async move { Ok(self.tables.lock().settings.get(user_id).cloned()) })
    }

    fn upsert_baseline<'a>(
        &'a self,
        user_id: &'a str,
        baseline_usd: f64,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<AccountSettings>> {
        Box::pin(async move {
            let settings = AccountSettings {
                user_id: user_id.to_string(),
                pnl_baseline_usd: Some(baseline_usd),
                pnl_baseline_at: Some(at),
            };
            self.tables
                .lock()
                .settings
                .insert(user_id.to_string(), settings.clone());
            Ok(settings)
        })
    }

    fn create_session(&self, session: SessionRow) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.tables.lock().sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn session(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<SessionRow>>> {
        Box::pin(async move { Ok(self.tables.lock().sessions.get(&id).cloned()) })
    }

    fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if let Some(s) = self.tables.lock().sessions.get_mut(&id) {
                s.revoked_at.get_or_insert(at);
            }
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
