//! Historical candle backfill.
//!
//! A chart needs history before the live feed has produced anything. The
//! `Backfiller` tries progressively cheaper sources until one yields bars:
//! the full history from the coin's launch date, the same range in 90-day
//! chunks, a few fixed recent windows, the recent trade tape and finally a
//! synthetic walk around the current mid.

use crate::candle::{dedupe_sorted, Candle, CandleSeries, Timeframe};
use crate::error::{MarketError, MarketResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use perpsvc_core::BoxFuture;
use perpsvc_telemetry::Metrics;
use perpsvc_venue::hyperliquid::{DynHyperliquidApi, WireTrade};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DAY_MS: i64 = 86_400_000;
const YEAR_MS: i64 = 365 * DAY_MS;

/// Oldest point the launch search will consider.
const SEARCH_HORIZON_MS: i64 = 20 * YEAR_MS;
const PROBE_YEARS: [i64; 6] = [20, 15, 10, 5, 2, 1];
const PROBE_WINDOW_MS: i64 = 30 * DAY_MS;
const SEARCH_WINDOW_MS: i64 = 60 * DAY_MS;
const SEARCH_STEP_MS: i64 = 3 * DAY_MS;
const MAX_SEARCH_PROBES: u32 = 30;
const LAUNCH_MARGIN_MS: i64 = 7 * DAY_MS;
const CHUNK_MS: i64 = 90 * DAY_MS;

/// `(start offset, end offset)` back from now.
const RECENT_WINDOWS: [(i64, i64); 4] = [
    (7 * DAY_MS, 0),
    (30 * DAY_MS, 7 * DAY_MS),
    (90 * DAY_MS, 30 * DAY_MS),
    (365 * DAY_MS, 90 * DAY_MS),
];

/// Where historical candles and trades come from.
pub trait CandleSource: Send + Sync {
    fn candles<'a>(
        &'a self,
        coin: &'a str,
        timeframe: Timeframe,
        start_ms: i64,
        end_ms: i64,
    ) -> BoxFuture<'a, MarketResult<Vec<Candle>>>;

    fn recent_trades<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, MarketResult<Vec<WireTrade>>>;
}

pub type DynCandleSource = Arc<dyn CandleSource>;

/// `candleSnapshot` and `recentTrades` on the Hyperliquid info API.
pub struct HyperliquidCandleSource {
    api: DynHyperliquidApi,
}

impl HyperliquidCandleSource {
    pub fn new(api: DynHyperliquidApi) -> Self {
        Self { api }
    }
}

impl CandleSource for HyperliquidCandleSource {
    fn candles<'a>(
        &'a self,
        coin: &'a str,
        timeframe: Timeframe,
        start_ms: i64,
        end_ms: i64,
    ) -> BoxFuture<'a, MarketResult<Vec<Candle>>> {
        Box::pin(async move {
            let wire = self
                .api
                .candle_snapshot(coin, timeframe.as_str(), start_ms, end_ms)
                .await?;
            Ok(wire
                .iter()
                .map(Candle::from_wire)
                .filter(Candle::is_valid)
                .collect())
        })
    }

    fn recent_trades<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, MarketResult<Vec<WireTrade>>> {
        Box::pin(async move { Ok(self.api.recent_trades(coin).await?) })
    }
}

/// Finds the earliest date a coin has daily candles, cached per coin.
pub struct LaunchDateFinder {
    source: DynCandleSource,
    cache: DashMap<String, i64>,
}

impl LaunchDateFinder {
    pub fn new(source: DynCandleSource) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    pub fn cached(&self, coin: &str) -> Option<i64> {
        self.cache.get(coin).map(|v| *v)
    }

    /// Earliest date with data minus a week, or `now - 20y` when nothing
    /// is found. Probe failures count as "no data".
    pub async fn find(&self, coin: &str, now: i64) -> i64 {
        if let Some(cached) = self.cached(coin) {
            return cached;
        }

        let horizon = now - SEARCH_HORIZON_MS;
        let mut left = horizon;
        let mut right = now;
        let mut found = None;

        for years in PROBE_YEARS {
            let probe = now - years * YEAR_MS;
            if self.has_data(coin, probe, probe + PROBE_WINDOW_MS).await {
                found = Some(probe);
                right = probe;
                break;
            }
        }

        let mut probes = 0;
        while left <= right && probes < MAX_SEARCH_PROBES {
            probes += 1;
            let mid = left + (right - left) / 2;
            if self.has_data(coin, mid, mid + SEARCH_WINDOW_MS).await {
                found = Some(mid);
                right = mid - SEARCH_STEP_MS;
            } else {
                left = mid + SEARCH_STEP_MS;
            }
        }

        let launch = match found {
            Some(t) => t - LAUNCH_MARGIN_MS,
            None => horizon,
        };
        debug!(coin, launch, probes, "Launch date resolved");
        self.cache.insert(coin.to_string(), launch);
        launch
    }

    async fn has_data(&self, coin: &str, start: i64, end: i64) -> bool {
        match self.source.candles(coin, Timeframe::D1, start, end).await {
            Ok(candles) => !candles.is_empty(),
            Err(e) => {
                debug!(coin, start, error = %e, "Launch probe failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStrategy {
    FullHistory,
    Chunked,
    RecentWindows,
    Trades,
    Synthetic,
    Empty,
}

impl BackfillStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullHistory => "full_history",
            Self::Chunked => "chunked",
            Self::RecentWindows => "recent_windows",
            Self::Trades => "trades",
            Self::Synthetic => "synthetic",
            Self::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backfill {
    pub strategy: BackfillStrategy,
    /// Deduplicated by time and ascending.
    pub candles: Vec<Candle>,
}

pub struct Backfiller {
    source: DynCandleSource,
    launch: LaunchDateFinder,
}

impl Backfiller {
    pub fn new(source: DynCandleSource) -> Self {
        Self {
            launch: LaunchDateFinder::new(source.clone()),
            source,
        }
    }

    pub fn launch_dates(&self) -> &LaunchDateFinder {
        &self.launch
    }

    pub async fn backfill(
        &self,
        coin: &str,
        timeframe: Timeframe,
        now: i64,
        mid: Option<f64>,
    ) -> Backfill {
        let (strategy, candles) = self.collect(coin, timeframe, now, mid).await;
        let candles = dedupe_sorted(candles);
        let strategy = if candles.is_empty() {
            BackfillStrategy::Empty
        } else {
            strategy
        };
        Metrics::backfill(strategy.as_str());
        info!(
            coin,
            timeframe = %timeframe,
            strategy = strategy.as_str(),
            bars = candles.len(),
            "Backfill complete"
        );
        Backfill { strategy, candles }
    }

    async fn collect(
        &self,
        coin: &str,
        timeframe: Timeframe,
        now: i64,
        mid: Option<f64>,
    ) -> (BackfillStrategy, Vec<Candle>) {
        let launch = self.launch.find(coin, now).await;

        match self.source.candles(coin, timeframe, launch, now).await {
            Ok(candles) if !candles.is_empty() => return (BackfillStrategy::FullHistory, candles),
            Ok(_) => {}
            Err(e) => {
                debug!(coin, error = %e, "Full history request failed, falling back to chunks");
                let candles = self.chunked(coin, timeframe, launch, now).await;
                if !candles.is_empty() {
                    return (BackfillStrategy::Chunked, candles);
                }
            }
        }

        let candles = self.recent_windows(coin, timeframe, now).await;
        if !candles.is_empty() {
            return (BackfillStrategy::RecentWindows, candles);
        }

        match self.source.recent_trades(coin).await {
            Ok(trades) if !trades.is_empty() => {
                let candles = candles_from_trades(&trades, timeframe);
                if !candles.is_empty() {
                    return (BackfillStrategy::Trades, candles);
                }
            }
            Ok(_) => {}
            Err(e) => debug!(coin, error = %e, "Recent trades unavailable"),
        }

        match mid.filter(|m| m.is_finite() && *m > 0.0) {
            Some(mid) => {
                warn!(coin, timeframe = %timeframe, "No history available, using synthetic candles");
                let candles = synthetic_walk(timeframe, now, mid, &mut rand::thread_rng());
                (BackfillStrategy::Synthetic, candles)
            }
            None => (BackfillStrategy::Empty, Vec::new()),
        }
    }

    async fn chunked(&self, coin: &str, timeframe: Timeframe, start: i64, now: i64) -> Vec<Candle> {
        let mut all = Vec::new();
        let mut chunk_start = start;
        while chunk_start < now {
            let chunk_end = (chunk_start + CHUNK_MS).min(now);
            match self.source.candles(coin, timeframe, chunk_start, chunk_end).await {
                Ok(mut candles) => all.append(&mut candles),
                Err(e) => debug!(coin, chunk_start, error = %e, "Chunk failed"),
            }
            chunk_start += CHUNK_MS;
        }
        all
    }

    async fn recent_windows(&self, coin: &str, timeframe: Timeframe, now: i64) -> Vec<Candle> {
        let mut all = Vec::new();
        for (from, to) in RECENT_WINDOWS {
            match self.source.candles(coin, timeframe, now - from, now - to).await {
                Ok(mut candles) => all.append(&mut candles),
                Err(e) => debug!(coin, window_days = from / DAY_MS, error = %e, "Recent window failed"),
            }
        }
        all
    }
}

/// Bucket a trade tape into candles.
pub fn candles_from_trades(trades: &[WireTrade], timeframe: Timeframe) -> Vec<Candle> {
    let mut ordered: Vec<&WireTrade> = trades.iter().collect();
    ordered.sort_by_key(|t| t.time);
    let mut series = CandleSeries::new(timeframe);
    for trade in ordered {
        series.apply_tick(trade.time, trade.px);
    }
    series.bars().to_vec()
}

/// Random walk of `max_bars` bars around `mid`, the last bar in `now`'s bucket.
pub fn synthetic_walk<R: Rng + ?Sized>(
    timeframe: Timeframe,
    now: i64,
    mid: f64,
    rng: &mut R,
) -> Vec<Candle> {
    let count = timeframe.max_bars() as i64;
    let interval = timeframe.interval_ms();
    let last_bucket = timeframe.bucket(now);
    let mut price = mid;
    let mut candles = Vec::with_capacity(count as usize);

    for i in 0..count {
        let trend = (rng.gen::<f64>() - 0.5) * 0.01;
        let volatility = rng.gen::<f64>() * 0.02;
        let open = price;
        let close = open * (1.0 + trend + (rng.gen::<f64>() - 0.5) * volatility);
        let high = open.max(close) * (1.0 + rng.gen::<f64>() * 0.01);
        let low = open.min(close) * (1.0 - rng.gen::<f64>() * 0.01);
        candles.push(Candle {
            time: last_bucket - (count - 1 - i) * interval,
            open,
            high,
            low,
            close,
        });
        price = close;
    }
    candles
}

/// In-memory history for tests: daily-spaced bars from `listed_at`.
#[derive(Default)]
pub struct FakeCandleSource {
    listed_at: Mutex<Option<i64>>,
    /// Requests spanning more than this fail.
    max_span_ms: Mutex<Option<i64>>,
    /// Requests spanning more than this return no bars.
    empty_span_ms: Mutex<Option<i64>>,
    fail_all: Mutex<bool>,
    trades: Mutex<Vec<WireTrade>>,
    calls: Mutex<Vec<(Timeframe, i64, i64)>>,
}

impl FakeCandleSource {
    /// Bars returned per request at most.
    pub const PAGE: usize = 500;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn listed_at(&self, t: i64) {
        *self.listed_at.lock() = Some(t);
    }

    pub fn max_span(&self, ms: i64) {
        *self.max_span_ms.lock() = Some(ms);
    }

    pub fn empty_over(&self, ms: i64) {
        *self.empty_span_ms.lock() = Some(ms);
    }

    pub fn fail_all(&self) {
        *self.fail_all.lock() = true;
    }

    pub fn set_trades(&self, trades: Vec<WireTrade>) {
        *self.trades.lock() = trades;
    }

    pub fn calls(&self) -> Vec<(Timeframe, i64, i64)> {
        self.calls.lock().clone()
    }
}

impl CandleSource for FakeCandleSource {
    fn candles<'a>(
        &'a self,
        _coin: &'a str,
        timeframe: Timeframe,
        start_ms: i64,
        end_ms: i64,
    ) -> BoxFuture<'a, MarketResult<Vec<Candle>>> {
        Box::pin(async move {
            self.calls.lock().push((timeframe, start_ms, end_ms));
            let too_long = self
                .max_span_ms
                .lock()
                .map_or(false, |max| end_ms - start_ms > max);
            if *self.fail_all.lock() || too_long {
                return Err(MarketError::Parse("candle snapshot unavailable".to_string()));
            }
            let too_wide = self
                .empty_span_ms
                .lock()
                .map_or(false, |max| end_ms - start_ms > max);
            let Some(listed) = *self.listed_at.lock() else {
                return Ok(Vec::new());
            };
            if too_wide {
                return Ok(Vec::new());
            }

            let interval = timeframe.interval_ms();
            let first = timeframe.bucket(start_ms.max(listed));
            let first = if first < start_ms.max(listed) { first + interval } else { first };
            let mut out = Vec::new();
            let mut t = first;
            while t <= end_ms && out.len() < Self::PAGE {
                out.push(Candle::flat(t, 100.0 + out.len() as f64));
                t += interval;
            }
            Ok(out)
        })
    }

    fn recent_trades<'a>(&'a self, _coin: &'a str) -> BoxFuture<'a, MarketResult<Vec<WireTrade>>> {
        Box::pin(async move { Ok(self.trades.lock().clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: i64 = 1_760_000_000_000;

    fn backfiller(source: &Arc<FakeCandleSource>) -> Backfiller {
        Backfiller::new(source.clone())
    }

    fn trade(time: i64, px: f64) -> WireTrade {
        WireTrade {
            coin: "BTC".to_string(),
            side: "B".to_string(),
            px,
            sz: 1.0,
            time,
        }
    }

    #[tokio::test]
    async fn test_launch_date_lands_before_listing() {
        let source = Arc::new(FakeCandleSource::new());
        let listed = NOW - 3 * YEAR_MS;
        source.listed_at(listed);
        let finder = LaunchDateFinder::new(source.clone());

        let launch = finder.find("BTC", NOW).await;
        assert!(launch <= listed - LAUNCH_MARGIN_MS, "launch {launch} listed {listed}");
        assert!(launch >= listed - 71 * DAY_MS, "launch {launch} listed {listed}");

        let probes = source.calls().len();
        assert!(probes <= PROBE_YEARS.len() + MAX_SEARCH_PROBES as usize);

        // cached
        assert_eq!(finder.find("BTC", NOW).await, launch);
        assert_eq!(source.calls().len(), probes);
    }

    #[tokio::test]
    async fn test_launch_date_falls_back_to_horizon() {
        let source = Arc::new(FakeCandleSource::new());
        source.fail_all();
        let finder = LaunchDateFinder::new(source.clone());
        assert_eq!(finder.find("ETH", NOW).await, NOW - SEARCH_HORIZON_MS);
        assert_eq!(finder.cached("ETH"), Some(NOW - SEARCH_HORIZON_MS));
    }

    #[tokio::test]
    async fn test_full_history_wins() {
        let source = Arc::new(FakeCandleSource::new());
        source.listed_at(NOW - 30 * DAY_MS);
        let result = backfiller(&source)
            .backfill("SOL", Timeframe::D1, NOW, Some(150.0))
            .await;
        assert_eq!(result.strategy, BackfillStrategy::FullHistory);
        assert!(result.candles.len() >= 29);
        assert!(result.candles.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[tokio::test]
    async fn test_chunks_after_full_request_fails() {
        let source = Arc::new(FakeCandleSource::new());
        let listed = NOW - 3 * YEAR_MS;
        source.listed_at(listed);
        source.max_span(100 * DAY_MS);

        let result = backfiller(&source)
            .backfill("BTC", Timeframe::D1, NOW, None)
            .await;
        assert_eq!(result.strategy, BackfillStrategy::Chunked);
        assert!(result.candles.first().unwrap().time >= listed);
        assert!(result.candles.last().unwrap().time <= NOW);
        assert!(result.candles.len() > 1_000);
        assert!(result.candles.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[tokio::test]
    async fn test_recent_windows_accumulate() {
        let source = Arc::new(FakeCandleSource::new());
        source.listed_at(NOW - 3 * YEAR_MS);
        source.empty_over(30 * DAY_MS);

        let result = backfiller(&source)
            .backfill("BTC", Timeframe::D1, NOW, None)
            .await;
        // full history comes back empty; the 7d and 23d windows have bars
        assert_eq!(result.strategy, BackfillStrategy::RecentWindows);
        assert!(result.candles.first().unwrap().time < NOW - 7 * DAY_MS);
        assert!(result.candles.first().unwrap().time >= NOW - 30 * DAY_MS);
        assert!(result.candles.len() >= 29);
        assert!(result.candles.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[tokio::test]
    async fn test_trades_then_synthetic() {
        let source = Arc::new(FakeCandleSource::new());
        source.fail_all();
        let minute = Timeframe::M1.bucket(NOW);
        source.set_trades(vec![
            trade(minute + 5_000, 101.0),
            trade(minute - 30_000, 100.0),
            trade(minute + 1_000, 99.0),
        ]);

        let result = backfiller(&source)
            .backfill("BTC", Timeframe::M1, NOW, Some(100.0))
            .await;
        assert_eq!(result.strategy, BackfillStrategy::Trades);
        assert_eq!(result.candles.len(), 2);
        assert_eq!(result.candles[1].open, 99.0);
        assert_eq!(result.candles[1].close, 101.0);

        source.set_trades(Vec::new());
        let result = backfiller(&source)
            .backfill("BTC", Timeframe::H1, NOW, Some(100.0))
            .await;
        assert_eq!(result.strategy, BackfillStrategy::Synthetic);
        assert_eq!(result.candles.len(), Timeframe::H1.max_bars());
        assert_eq!(result.candles.last().unwrap().time, Timeframe::H1.bucket(NOW));

        let result = backfiller(&source)
            .backfill("BTC", Timeframe::H1, NOW, None)
            .await;
        assert_eq!(result.strategy, BackfillStrategy::Empty);
        assert!(result.candles.is_empty());
    }

    #[test]
    fn test_synthetic_walk_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let candles = synthetic_walk(Timeframe::D1, NOW, 50.0, &mut rng);
        assert_eq!(candles.len(), Timeframe::D1.max_bars());
        assert_eq!(candles[0].open, 50.0);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, DAY_MS);
            assert_eq!(pair[1].open, pair[0].close);
        }
        for c in &candles {
            assert!(c.low > 0.0);
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
        }
    }
}
