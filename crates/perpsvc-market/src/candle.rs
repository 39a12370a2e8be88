//! Candle series for the chart panel.

use crate::error::MarketError;
use perpsvc_venue::hyperliquid::WireCandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamps below this are treated as seconds.
const SECONDS_CUTOFF: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    pub fn interval_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Self::M1 => MINUTE,
            Self::M5 => 5 * MINUTE,
            Self::M15 => 15 * MINUTE,
            Self::H1 => 60 * MINUTE,
            Self::H4 => 240 * MINUTE,
            Self::D1 => 1_440 * MINUTE,
        }
    }

    /// Bars kept in memory and produced by a synthetic backfill.
    pub fn max_bars(&self) -> usize {
        match self {
            Self::M1 => 10_000,
            Self::M5 => 8_000,
            Self::M15 => 6_000,
            Self::H1 => 4_000,
            Self::H4 => 3_000,
            Self::D1 => 2_000,
        }
    }

    /// Bucket start for `t` (seconds or milliseconds).
    pub fn bucket(&self, t: i64) -> i64 {
        let interval = self.interval_ms();
        normalize_ms(t).div_euclid(interval) * interval
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| MarketError::InvalidTimeframe(s.to_string()))
    }
}

/// Seconds are scaled to milliseconds; anything else passes through.
pub fn normalize_ms(t: i64) -> i64 {
    if t.unsigned_abs() < SECONDS_CUTOFF as u64 {
        t * 1000
    } else {
        t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start (ms).
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn flat(time: i64, price: f64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    pub fn from_wire(wire: &WireCandle) -> Self {
        Self {
            time: normalize_ms(wire.t),
            open: wire.o,
            high: wire.h,
            low: wire.l,
            close: wire.c,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Sort by time and keep the last candle seen for each timestamp.
pub fn dedupe_sorted(candles: Vec<Candle>) -> Vec<Candle> {
    let mut by_time = std::collections::BTreeMap::new();
    for candle in candles {
        by_time.insert(candle.time, candle);
    }
    by_time.into_values().collect()
}

/// Bars for one coin and timeframe, strictly increasing by time.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    timeframe: Timeframe,
    bars: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            bars: Vec::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &[Candle] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Candle> {
        self.bars.last()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Replace the last bar if it is the same bucket, append if newer.
    ///
    /// Returns whether the series changed.
    pub fn apply_ohlc(&mut self, candle: Candle) -> bool {
        if !candle.is_valid() {
            return false;
        }
        let candle = Candle {
            time: self.timeframe.bucket(candle.time),
            ..candle
        };
        match self.bars.last_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            Some(last) if last.time > candle.time => return false,
            _ => self.push(candle),
        }
        true
    }

    /// Fold a trade or mid print into the series.
    pub fn apply_tick(&mut self, t: i64, price: f64) -> bool {
        if !(price.is_finite() && price > 0.0) {
            return false;
        }
        let time = self.timeframe.bucket(t);
        match self.bars.last_mut() {
            Some(last) if last.time == time => {
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                last.close = price;
            }
            Some(last) if last.time > time => return false,
            _ => self.push(Candle::flat(time, price)),
        }
        true
    }

    /// Open a flat bar at `now`'s bucket when the last bar is stale.
    pub fn roll(&mut self, now: i64) -> Option<Candle> {
        let time = self.timeframe.bucket(now);
        let last = self.bars.last()?;
        if last.time >= time {
            return None;
        }
        let bar = Candle::flat(time, last.close);
        self.push(bar);
        Some(bar)
    }

    /// Merge historical bars under the live ones; live bars win on equal time.
    pub fn merge_history(&mut self, history: Vec<Candle>) {
        let mut all = history;
        all.append(&mut self.bars);
        self.bars = dedupe_sorted(
            all.into_iter()
                .filter(Candle::is_valid)
                .map(|c| Candle {
                    time: self.timeframe.bucket(c.time),
                    ..c
                })
                .collect(),
        );
        let excess = self.bars.len().saturating_sub(self.timeframe.max_bars());
        self.bars.drain(..excess);
    }

    fn push(&mut self, candle: Candle) {
        self.bars.push(candle);
        self.enforce_retention();
    }

    fn enforce_retention(&mut self) {
        let max = self.timeframe.max_bars();
        if self.bars.len() * 10 > max * 11 {
            let drop = max / 10;
            self.bars.drain(..drop.min(self.bars.len()));
        }
    }
}
