//! Order-book grouping for the depth panel.
//!
//! Raw `l2Book` levels are folded into price buckets whose width is one of
//! a handful of spreads chosen from the coin and its mid price. The panel
//! always shows `BUCKETS` rows per side; missing rows are filled with
//! synthetic levels marked as such.

use perpsvc_venue::hyperliquid::L2Book;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rows per side.
pub const BUCKETS: usize = 12;

/// Used when there is no book to derive a mid from.
pub const DEFAULT_SPREADS: &[f64] = &[1.0, 10.0, 20.0, 50.0, 100.0];

const TIER_LARGE: &[f64] = &[1.0, 10.0, 50.0, 100.0, 1000.0, 10000.0];
const TIER_MAJOR: &[f64] = &[0.1, 1.0, 5.0, 10.0, 50.0, 100.0];
const TIER_MID: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0];
const TIER_SMALL: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0];
const TIER_MICRO: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5];
const TIER_SUB_DOLLAR: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1];
const TIER_CENTS: &[f64] = &[0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01];
const TIER_DUST: &[f64] = &[0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001];

const MID_CAPS: &[&str] = &["SOL", "BNB", "AVAX", "MATIC", "DOT", "UNI", "LINK", "LTC", "AAVE", "MKR", "CRV"];
const SMALL_CAPS: &[&str] = &["XRP", "ADA", "TRX", "XLM", "VET", "HBAR", "ALGO", "ATOM", "ICP", "FIL"];
const MEME_COINS: &[&str] = &["DOGE", "SHIB", "PEPE", "FLOKI", "BONK"];

/// Synthetic rows get a size in this range.
const SYNTHETIC_SIZE: std::ops::Range<f64> = 100.0..300.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BookLevel {
    pub px: f64,
    pub sz: f64,
}

impl BookLevel {
    fn is_valid(&self) -> bool {
        self.px.is_finite() && self.px > 0.0 && self.sz.is_finite() && self.sz > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedLevel {
    pub price: f64,
    pub size: f64,
    /// Raw levels folded into this bucket; 0 for synthetic rows.
    pub count: u32,
    /// Cumulative size from the top of book.
    pub total: f64,
    /// Cumulative `price * size` in USD.
    pub notional: f64,
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedBook {
    pub coin: String,
    pub spread: f64,
    pub options: Vec<f64>,
    pub mid: Option<f64>,
    pub time: i64,
    pub bids: Vec<GroupedLevel>,
    pub asks: Vec<GroupedLevel>,
}

/// Split a wire snapshot into bid and ask levels.
pub fn levels_from_book(book: &L2Book) -> (Vec<BookLevel>, Vec<BookLevel>) {
    let convert = |levels: &[perpsvc_venue::hyperliquid::WireLevel]| {
        levels
            .iter()
            .map(|l| BookLevel { px: l.px, sz: l.sz })
            .collect::<Vec<_>>()
    };
    (convert(book.bids()), convert(book.asks()))
}

/// Midpoint of best bid and best ask, or whichever side exists.
pub fn mid_price(bids: &[BookLevel], asks: &[BookLevel]) -> Option<f64> {
    let best_bid = bids
        .iter()
        .filter(|l| l.is_valid())
        .map(|l| l.px)
        .fold(None, |acc: Option<f64>, px| Some(acc.map_or(px, |a| a.max(px))));
    let best_ask = asks
        .iter()
        .filter(|l| l.is_valid())
        .map(|l| l.px)
        .fold(None, |acc: Option<f64>, px| Some(acc.map_or(px, |a| a.min(px))));
    match (best_bid, best_ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(px), None) | (None, Some(px)) => Some(px),
        (None, None) => None,
    }
}

/// Spread choices for a coin; first matching tier wins.
pub fn spread_options(coin: &str, mid: Option<f64>) -> &'static [f64] {
    let Some(mid) = mid.filter(|m| m.is_finite() && *m > 0.0) else {
        return DEFAULT_SPREADS;
    };
    let upper = coin.to_ascii_uppercase();
    let coin = upper.strip_suffix("-PERP").unwrap_or(&upper);

    if coin == "BTC" || mid > 90_000.0 {
        TIER_LARGE
    } else if coin == "ETH" || mid > 3_000.0 {
        TIER_MAJOR
    } else if MID_CAPS.contains(&coin) || mid > 100.0 {
        TIER_MID
    } else if SMALL_CAPS.contains(&coin) || mid > 10.0 {
        TIER_SMALL
    } else if MEME_COINS.contains(&coin) || mid > 1.0 {
        TIER_MICRO
    } else if mid > 0.1 {
        TIER_SUB_DOLLAR
    } else if mid > 0.01 {
        TIER_CENTS
    } else {
        TIER_DUST
    }
}

/// The requested spread if it is one of `options`, else the first option.
pub fn resolve_spread(options: &[f64], requested: Option<f64>) -> f64 {
    let first = options.first().copied().unwrap_or(1.0);
    match requested {
        Some(req) => options
            .iter()
            .copied()
            .find(|o| (o - req).abs() <= o.abs() * 1e-9)
            .unwrap_or(first),
        None => first,
    }
}

/// Decimal places needed to print `spread` exactly.
fn spread_decimals(spread: f64) -> i32 {
    for d in 0..=10 {
        let scaled = spread * 10f64.powi(d);
        if (scaled - scaled.round()).abs() < 1e-9 * scaled.max(1.0) {
            return d;
        }
    }
    10
}

fn bucket_price(index: i64, spread: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (index as f64 * spread * factor).round() / factor
}

fn bucket_index(px: f64, spread: f64, side: BookSide) -> i64 {
    let ratio = px / spread;
    let idx = if spread <= 100.0 {
        ratio.round()
    } else {
        match side {
            BookSide::Ask => ratio.ceil(),
            BookSide::Bid => ratio.floor(),
        }
    };
    idx as i64
}

/// Fold `levels` into at most `BUCKETS` rows of width `spread`.
///
/// Asks come out ascending, bids descending. When fewer than `BUCKETS`
/// real buckets exist the side is extended away from the touch with
/// synthetic rows while prices stay positive.
pub fn group_levels<R: Rng + ?Sized>(
    levels: &[BookLevel],
    side: BookSide,
    spread: f64,
    rng: &mut R,
) -> Vec<GroupedLevel> {
    if !(spread.is_finite() && spread > 0.0) {
        return Vec::new();
    }

    let mut buckets: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
    for level in levels.iter().filter(|l| l.is_valid()) {
        let entry = buckets
            .entry(bucket_index(level.px, spread, side))
            .or_insert((0.0, 0));
        entry.0 += level.sz;
        entry.1 += 1;
    }
    if buckets.is_empty() {
        return Vec::new();
    }

    let mut rows: Vec<(i64, f64, u32, bool)> = match side {
        BookSide::Ask => buckets.into_iter().map(|(i, (sz, n))| (i, sz, n, false)).collect(),
        BookSide::Bid => buckets.into_iter().rev().map(|(i, (sz, n))| (i, sz, n, false)).collect(),
    };

    let decimals = spread_decimals(spread);
    let step = match side {
        BookSide::Ask => 1,
        BookSide::Bid => -1,
    };
    let mut next = rows.last().map(|r| r.0 + step).unwrap_or(0);
    while rows.len() < BUCKETS && bucket_price(next, spread, decimals) > 0.0 {
        rows.push((next, rng.gen_range(SYNTHETIC_SIZE), 0, true));
        next += step;
    }
    rows.truncate(BUCKETS);

    let mut total = 0.0;
    let mut notional = 0.0;
    rows.into_iter()
        .map(|(index, size, count, synthetic)| {
            let price = bucket_price(index, spread, decimals);
            total += size;
            notional += price * size;
            GroupedLevel {
                price,
                size,
                count,
                total,
                notional,
                synthetic,
            }
        })
        .collect()
}

/// Group both sides with a spread picked from the book's own mid.
pub fn group_book<R: Rng + ?Sized>(
    coin: &str,
    bids: &[BookLevel],
    asks: &[BookLevel],
    requested_spread: Option<f64>,
    time: i64,
    rng: &mut R,
) -> GroupedBook {
    let mid = mid_price(bids, asks);
    let options = spread_options(coin, mid);
    let spread = resolve_spread(options, requested_spread);
    GroupedBook {
        coin: coin.to_string(),
        spread,
        options: options.to_vec(),
        mid,
        time,
        bids: group_levels(bids, BookSide::Bid, spread, rng),
        asks: group_levels(asks, BookSide::Ask, spread, rng),
    }
}
