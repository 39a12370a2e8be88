//! Postgres-backed store.

use crate::error::StoreResult;
use crate::models::{AccountSettings, CustodialWalletRow, NewCustodialWallet, SessionRow, WalletRow};
use crate::store::Store;
use chrono::{DateTime, Utc};
use perpsvc_core::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run embedded migrations.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(max_connections, "Connected to Postgres, migrations applied");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Store for PgStore {
    fn record_login<'a>(&'a self, address: &'a str, at: DateTime<Utc>) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(address)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO wallets (address, user_id, last_login_at) VALUES ($1, $1, $2) \
                 ON CONFLICT (address) DO UPDATE SET last_login_at = EXCLUDED.last_login_at",
            )
            .bind(address)
            .bind(at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            debug!(address, "Recorded login");
            Ok(())
        })
    }

    fn wallet_for_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<WalletRow>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, WalletRow>(
                "SELECT address, user_id, last_login_at, address_1 FROM wallets \
                 WHERE user_id = $1 ORDER BY last_login_at DESC NULLS LAST LIMIT 1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
    }

    fn upsert_wallet<'a>(&'a self, address: &'a str, user_id: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO wallets (address, user_id) VALUES ($1, $2) \
                 ON CONFLICT (address) DO UPDATE SET user_id = EXCLUDED.user_id",
            )
            .bind(address)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn update_address1<'a>(&'a self, user_id: &'a str, address1: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE wallets SET address_1 = $1 WHERE user_id = $2")
                .bind(address1)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn custodial_wallet<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<CustodialWalletRow>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, CustodialWalletRow>(
                "SELECT id, user_id, public_key, secret_sealed, wrapped_key, drift_subaccount, \
                 drift_user_pda, created_at FROM custodial_wallets \
                 WHERE user_id = $1 ORDER BY id ASC LIMIT 1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
    }

    fn insert_custodial_wallet(&self, wallet: NewCustodialWallet) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO custodial_wallets (user_id, public_key, secret_sealed, wrapped_key, created_at) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(&wallet.user_id)
            .bind(&wallet.public_key)
            .bind(&wallet.secret_sealed)
            .bind(&wallet.wrapped_key)
            .bind(wallet.created_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn set_drift_account<'a>(
        &'a self,
        user_id: &'a str,
        subaccount: i32,
        user_pda: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE custodial_wallets SET \
                 drift_subaccount = COALESCE(drift_subaccount, $2), \
                 drift_user_pda = COALESCE(drift_user_pda, $3) \
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(subaccount)
            .bind(user_pda)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn account_settings<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<AccountSettings>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, AccountSettings>(
                "SELECT user_id, pnl_baseline_usd, pnl_baseline_at FROM account_settings WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
    }

    fn upsert_baseline<'a>(
        &'a self,
        user_id: &'a str,
        baseline_usd: f64,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<AccountSettings>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, AccountSettings>(
                "INSERT INTO account_settings (user_id, pnl_baseline_usd, pnl_baseline_at) \
                 VALUES ($1, $2, $3) ON CONFLICT (user_id) DO UPDATE SET \
                 pnl_baseline_usd = EXCLUDED.pnl_baseline_usd, pnl_baseline_at = EXCLUDED.pnl_baseline_at \
                 RETURNING user_id, pnl_baseline_usd, pnl_baseline_at",
            )
            .bind(user_id)
            .bind(baseline_usd)
            .bind(at)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        })
    }

    fn create_session(&self, session: SessionRow) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO sessions (id, user_id, created_at, expires_at, revoked_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(session.id)
            .bind(&session.user_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn session(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<SessionRow>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, SessionRow>(
                "SELECT id, user_id, created_at, expires_at, revoked_at FROM sessions WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
    }

    fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}
