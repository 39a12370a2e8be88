//! Row types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A login wallet linked to a user.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct WalletRow {
    pub address: String,
    pub user_id: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub address_1: Option<String>,
}

/// The custodial keypair held for a user. The secret is sealed.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CustodialWalletRow {
    pub id: i64,
    pub user_id: String,
    pub public_key: String,
    pub secret_sealed: String,
    pub wrapped_key: String,
    pub drift_subaccount: Option<i32>,
    pub drift_user_pda: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustodialWallet {
    pub user_id: String,
    pub public_key: String,
    pub secret_sealed: String,
    pub wrapped_key: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user display settings.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AccountSettings {
    pub user_id: String,
    pub pnl_baseline_usd: Option<f64>,
    pub pnl_baseline_at: Option<DateTime<Utc>>,
}

/// Server-side session record backing a session token.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    /// Not revoked and not past expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}
