//! Persistence for perpsvc.
//!
//! `Store` is the only seam handlers use. `PgStore` talks to Postgres via
//! sqlx; `MemoryStore` backs tests and local runs without a database.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use models::{
    AccountSettings, CustodialWalletRow, NewCustodialWallet, SessionRow, WalletRow,
};
pub use postgres::PgStore;
pub use store::{DynStore, Store};
