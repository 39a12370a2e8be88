//! Drift perps: market table, order parameters, account addresses and the gateway seam.

pub mod gateway;
pub mod markets;
pub mod params;
pub mod pda;
pub mod trader;

pub use gateway::{DriftGateway, DynDriftGateway, FakeDriftGateway, HttpDriftGateway, DEFAULT_GATEWAY_URL};
pub use markets::{market_index, PERP_MARKETS};
pub use params::{DriftOrderParams, BASE_PRECISION, PRICE_PRECISION};
pub use pda::{user_account_pda, user_stats_pda, DRIFT_PROGRAM_ID};
pub use trader::{DriftPlaced, DriftTrader};
