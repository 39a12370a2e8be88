//! Venue adapters for the perpsvc backend.
//!
//! - `hyperliquid`: info queries, L1 action signing, order placement, positions
//! - `drift`: market table, fixed-point order params, user-account PDAs, gateway seam
//! - `jupiter`: swap quotes and custodial SOL/USDC swaps
//!
//! Every upstream is reached through a trait (`HyperliquidApi`, `DriftGateway`,
//! `SwapApi`) so handlers can run against the in-memory fakes.

pub mod drift;
pub mod error;
pub mod hyperliquid;
pub mod jupiter;

pub use drift::{
    market_index, user_account_pda, DriftGateway, DriftOrderParams, DriftPlaced, DriftTrader,
    DynDriftGateway, FakeDriftGateway, HttpDriftGateway,
};
pub use error::{ClientError, ClientResult};
pub use hyperliquid::{
    DynHyperliquidApi, FakeHyperliquid, HyperliquidApi, HyperliquidClient, HyperliquidSigner,
    HyperliquidTrader, PlacedOrder,
};
pub use jupiter::{
    DynSwapApi, FakeSwapApi, JupiterClient, Quote, RateQuote, SwapApi, SwapReceipt, Swapper,
};
