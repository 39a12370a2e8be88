//! Market data for the trading panels.
//!
//! - `book`: order-book grouping into spread buckets
//! - `candle`: timeframes and live candle series
//! - `backfill`: historical candles with layered fallbacks
//! - `hub`: consumer of the upstream WebSocket feed, broadcasting updates

pub mod backfill;
pub mod book;
pub mod candle;
pub mod error;
pub mod hub;

pub use backfill::{
    Backfill, BackfillStrategy, Backfiller, CandleSource, DynCandleSource, FakeCandleSource,
    HyperliquidCandleSource, LaunchDateFinder,
};
pub use book::{
    group_book, group_levels, mid_price, resolve_spread, spread_options, BookLevel, BookSide,
    GroupedBook, GroupedLevel, BUCKETS, DEFAULT_SPREADS,
};
pub use candle::{Candle, CandleSeries, Timeframe};
pub use error::{MarketError, MarketResult};
pub use hub::{event_json, BookSnapshot, HubEvent, MarketHub};
