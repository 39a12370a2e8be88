//! HTTP surface of the perpsvc backend.
//!
//! - `/api/auth/*`, `/api/me`: wallet-signature login and cookie sessions
//! - `/api/wallet/*`, `/api/account/*`: custodial wallet, balances, withdrawals, activity
//! - `/api/trading/*`: Hyperliquid and Drift order proxy, positions
//! - `/api/exchange/*`: Jupiter SOL/USDC quotes and swaps
//! - `/api/market/*`: grouped order book, candles, mids and the live stream
//!
//! Pages outside `/api` sit behind a session gate that redirects to `/login`.

pub mod config;
pub mod error;
pub mod extract;
pub mod gate;
pub mod limiter;
pub mod routes;
pub mod server;
pub mod state;
pub mod stream;

pub use config::{Policy, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use extract::AuthUser;
pub use limiter::{ConnectionLimiter, WindowLimiter};
pub use server::{create_router, run_server};
pub use state::{AppState, Services};
