//! Hyperliquid perps: info queries, L1 signing and order placement.

pub mod client;
pub mod nonce;
pub mod positions;
pub mod signing;
pub mod trader;
pub mod types;

pub use client::{
    first_status_error, parse_mids, parse_universe, DynHyperliquidApi, FakeHyperliquid,
    HyperliquidApi, HyperliquidClient, DEFAULT_API_URL,
};
pub use nonce::NonceSource;
pub use positions::{positions, MarginView, OpenOrderView, PositionView};
pub use signing::{Action, ExchangeRequest, HyperliquidSigner};
pub use trader::{HyperliquidTrader, LegKind, LegResult, PlacedOrder};
pub use types::{ClearinghouseState, L2Book, MarginSummary, WireCandle, WireLevel, WireTrade};
