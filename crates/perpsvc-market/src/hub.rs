//! Live market hub.
//!
//! Consumes channel messages from the upstream WebSocket and keeps the
//! latest book per coin, the mids map and the live candle series. Every
//! change is published on a `broadcast` channel for the stream endpoint.

use crate::book::BookLevel;
use crate::candle::{Candle, CandleSeries, Timeframe};
use crate::error::MarketResult;
use dashmap::DashMap;
use parking_lot::RwLock;
use perpsvc_venue::hyperliquid::{parse_mids, L2Book, WireCandle, WireTrade};
use perpsvc_ws::{SubscribeHandle, Subscription, WsMessage};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const EVENT_CAPACITY: usize = 1024;
const ROLL_INTERVAL: Duration = Duration::from_secs(1);

/// Latest raw book for one coin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSnapshot {
    pub coin: String,
    pub time: i64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl From<&L2Book> for BookSnapshot {
    fn from(book: &L2Book) -> Self {
        let (bids, asks) = crate::book::levels_from_book(book);
        Self {
            coin: book.coin.clone(),
            time: book.time,
            bids,
            asks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HubEvent {
    Book(BookSnapshot),
    Candle {
        coin: String,
        timeframe: Timeframe,
        candle: Candle,
    },
    Mids {
        mids: HashMap<String, f64>,
    },
}

impl HubEvent {
    /// Coin the event concerns; `None` for market-wide events.
    pub fn coin(&self) -> Option<&str> {
        match self {
            Self::Book(book) => Some(&book.coin),
            Self::Candle { coin, .. } => Some(coin),
            Self::Mids { .. } => None,
        }
    }
}

type SeriesKey = (String, Timeframe);

pub struct MarketHub {
    books: DashMap<String, BookSnapshot>,
    series: DashMap<SeriesKey, CandleSeries>,
    mids: RwLock<HashMap<String, f64>>,
    events: broadcast::Sender<HubEvent>,
    upstream: RwLock<Option<SubscribeHandle>>,
}

impl Default for MarketHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            books: DashMap::new(),
            series: DashMap::new(),
            mids: RwLock::new(HashMap::new()),
            events,
            upstream: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    pub fn book(&self, coin: &str) -> Option<BookSnapshot> {
        self.books.get(coin).map(|b| b.clone())
    }

    pub fn mids(&self) -> HashMap<String, f64> {
        self.mids.read().clone()
    }

    pub fn mid(&self, coin: &str) -> Option<f64> {
        self.mids.read().get(coin).copied()
    }

    /// Route `track` requests for new coins to the upstream feed.
    pub fn attach_upstream(&self, handle: SubscribeHandle) {
        *self.upstream.write() = Some(handle);
    }

    /// Start keeping a live series for `coin` at `timeframe`, and ask the
    /// upstream feed for its book and candles if it is not already sending them.
    pub fn track(&self, coin: &str, timeframe: Timeframe) {
        self.series
            .entry((coin.to_string(), timeframe))
            .or_insert_with(|| CandleSeries::new(timeframe));

        let upstream = self.upstream.read();
        let Some(handle) = upstream.as_ref() else {
            return;
        };
        for sub in [
            Subscription::l2_book(coin),
            Subscription::candle(coin, timeframe.as_str()),
        ] {
            if let Err(e) = handle.request(sub) {
                warn!(coin, timeframe = %timeframe, error = %e, "Upstream subscribe failed");
            }
        }
    }

    pub fn is_tracked(&self, coin: &str, timeframe: Timeframe) -> bool {
        self.series.contains_key(&(coin.to_string(), timeframe))
    }

    pub fn candles(&self, coin: &str, timeframe: Timeframe) -> Option<Vec<Candle>> {
        self.series
            .get(&(coin.to_string(), timeframe))
            .map(|s| s.bars().to_vec())
    }

    /// Merge backfilled history under the live bars and return the result.
    pub fn seed(&self, coin: &str, timeframe: Timeframe, history: Vec<Candle>) -> Vec<Candle> {
        let mut series = self
            .series
            .entry((coin.to_string(), timeframe))
            .or_insert_with(|| CandleSeries::new(timeframe));
        series.merge_history(history);
        series.bars().to_vec()
    }

    /// Apply one upstream message. `now` stamps mid ticks.
    pub fn handle_message(&self, msg: &WsMessage, now: i64) -> MarketResult<()> {
        let WsMessage::Channel(channel) = msg else {
            return Ok(());
        };
        match channel.channel.as_str() {
            "l2Book" => {
                let book: L2Book = serde_json::from_value(channel.data.clone())?;
                self.apply_book(&book);
            }
            "candle" => {
                let wire: WireCandle = serde_json::from_value(channel.data.clone())?;
                self.apply_candle(&wire);
            }
            "trades" => {
                let trades: Vec<WireTrade> = serde_json::from_value(channel.data.clone())?;
                for trade in &trades {
                    self.apply_tick(&trade.coin, trade.time, trade.px);
                }
            }
            "allMids" => {
                let data = channel.data.get("mids").unwrap_or(&channel.data);
                self.apply_mids(parse_mids(data), now);
            }
            other => trace!(channel = other, "Ignoring channel"),
        }
        Ok(())
    }

    pub fn apply_book(&self, book: &L2Book) {
        let snapshot = BookSnapshot::from(book);
        self.books.insert(snapshot.coin.clone(), snapshot.clone());
        self.publish(HubEvent::Book(snapshot));
    }

    pub fn apply_candle(&self, wire: &WireCandle) {
        let Ok(timeframe) = wire.i.parse::<Timeframe>() else {
            debug!(coin = %wire.s, interval = %wire.i, "Candle for unsupported interval");
            return;
        };
        let candle = Candle::from_wire(wire);
        let updated = {
            let mut series = self
                .series
                .entry((wire.s.clone(), timeframe))
                .or_insert_with(|| CandleSeries::new(timeframe));
            if series.apply_ohlc(candle) {
                series.last().copied()
            } else {
                None
            }
        };
        if let Some(candle) = updated {
            self.publish(HubEvent::Candle {
                coin: wire.s.clone(),
                timeframe,
                candle,
            });
        }
    }

    /// Fold a price print into every tracked series of `coin`.
    pub fn apply_tick(&self, coin: &str, t: i64, price: f64) {
        let mut updated = Vec::new();
        for mut entry in self.series.iter_mut() {
            if entry.key().0 != coin {
                continue;
            }
            let timeframe = entry.key().1;
            if entry.value_mut().apply_tick(t, price) {
                if let Some(last) = entry.value().last() {
                    updated.push((timeframe, *last));
                }
            }
        }
        for (timeframe, candle) in updated {
            self.publish(HubEvent::Candle {
                coin: coin.to_string(),
                timeframe,
                candle,
            });
        }
    }

    pub fn apply_mids(&self, mids: HashMap<String, f64>, now: i64) {
        if mids.is_empty() {
            return;
        }
        self.mids.write().extend(mids.iter().map(|(k, v)| (k.clone(), *v)));
        for (coin, px) in &mids {
            self.apply_tick(coin, now, *px);
        }
        self.publish(HubEvent::Mids { mids });
    }

    /// Open a flat bar on every series whose last bar is stale.
    pub fn roll_all(&self, now: i64) {
        let mut rolled = Vec::new();
        for mut entry in self.series.iter_mut() {
            let (coin, timeframe) = entry.key().clone();
            if let Some(candle) = entry.value_mut().roll(now) {
                rolled.push((coin, timeframe, candle));
            }
        }
        for (coin, timeframe, candle) in rolled {
            self.publish(HubEvent::Candle {
                coin,
                timeframe,
                candle,
            });
        }
    }

    fn publish(&self, event: HubEvent) {
        // Err only means nobody is listening.
        if let Ok(n) = self.events.send(event) {
            trace!(receivers = n, "Hub event sent");
        }
    }

    /// Drain upstream messages and roll candles until cancelled.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<WsMessage>, shutdown: CancellationToken) {
        let mut roll = tokio::time::interval(ROLL_INTERVAL);
        roll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Market hub started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        warn!("Upstream message channel closed");
                        break;
                    };
                    let now = chrono::Utc::now().timestamp_millis();
                    if let Err(e) = self.handle_message(&msg, now) {
                        debug!(channel = msg.channel(), error = %e, "Dropping malformed market message");
                    }
                }
                _ = roll.tick() => {
                    self.roll_all(chrono::Utc::now().timestamp_millis());
                }
            }
        }
        info!("Market hub stopped");
    }
}

/// Serialize an event for a stream client.
pub fn event_json(event: &HubEvent) -> MarketResult<String> {
    Ok(serde_json::to_string(event)?)
}
