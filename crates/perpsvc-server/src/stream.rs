//! Authenticated market stream: grouped book and candle updates for one coin.

use crate::extract::AuthUser;
use crate::routes::market::{coin_or_default, grouped, latest_book};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use perpsvc_market::{Candle, GroupedBook, HubEvent, Timeframe};
use perpsvc_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::limiter::ConnectionGuard;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    coin: Option<String>,
    tf: Option<String>,
    spread: Option<f64>,
}

/// Frames sent to stream clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamMessage<'a> {
    Book(&'a GroupedBook),
    Candle {
        coin: &'a str,
        timeframe: Timeframe,
        candle: &'a Candle,
    },
}

struct Subscription {
    user_id: String,
    coin: String,
    timeframe: Timeframe,
    spread: Option<f64>,
}

impl Subscription {
    /// The frame for `event`, if this client wants it.
    fn frame(&self, event: &HubEvent) -> Option<String> {
        if event.coin() != Some(self.coin.as_str()) {
            return None;
        }
        let message = match event {
            HubEvent::Book(book) => {
                let grouped = grouped(book, self.spread);
                return serde_json::to_string(&StreamMessage::Book(&grouped)).ok();
            }
            HubEvent::Candle {
                coin,
                timeframe,
                candle,
            } if *timeframe == self.timeframe => StreamMessage::Candle {
                coin,
                timeframe: *timeframe,
                candle,
            },
            _ => return None,
        };
        serde_json::to_string(&message).ok()
    }
}

/// `GET /api/market/stream?coin=BTC&tf=1m&spread=10`
pub async fn stream_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let timeframe = match query.tf.as_deref().filter(|s| !s.is_empty()) {
        Some(tf) => match tf.parse::<Timeframe>() {
            Ok(tf) => tf,
            Err(e) => return crate::error::ApiError::from(e).into_response(),
        },
        None => Timeframe::M1,
    };

    let Some(guard) = state.stream_limiter.try_acquire() else {
        warn!(
            current = state.stream_limiter.current_count(),
            max = state.stream_limiter.max(),
            "Market stream connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let subscription = Subscription {
        user_id: user.user_id,
        coin: coin_or_default(query.coin.as_deref()),
        timeframe,
        spread: query.spread,
    };
    ws.on_upgrade(move |socket| handle_stream(socket, state, subscription, guard))
}

async fn handle_stream(socket: WebSocket, state: AppState, sub: Subscription, _guard: ConnectionGuard) {
    Metrics::stream_client_connected();
    info!(
        user = %sub.user_id,
        coin = %sub.coin,
        timeframe = %sub.timeframe,
        connections = state.stream_limiter.current_count(),
        "Market stream opened"
    );

    let hub = &state.services.hub;
    hub.track(&sub.coin, sub.timeframe);
    let mut events = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();

    match latest_book(&state, &sub.coin).await {
        Ok(book) => {
            let grouped = grouped(&book, sub.spread);
            if let Ok(json) = serde_json::to_string(&StreamMessage::Book(&grouped)) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("Failed to send initial book, client disconnected");
                    Metrics::stream_client_disconnected();
                    return;
                }
            }
        }
        Err(e) => warn!(coin = %sub.coin, error = %e, "No initial book for stream"),
    }

    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "Stream receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        let Some(frame) = sub.frame(&event) else { continue };
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            debug!("Failed to send update, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, coin = %sub.coin, "Stream client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Hub channel closed");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing stream");
                break;
            }
        }
    }
    incoming_task.abort();

    Metrics::stream_client_disconnected();
    info!(
        user = %sub.user_id,
        coin = %sub.coin,
        connections = state.stream_limiter.current_count().saturating_sub(1),
        "Market stream closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsvc_market::BookSnapshot;
    use perpsvc_market::BookLevel;

    fn sub() -> Subscription {
        Subscription {
            user_id: "user-1".to_string(),
            coin: "BTC".to_string(),
            timeframe: Timeframe::M1,
            spread: Some(10.0),
        }
    }

    fn candle_event(coin: &str, timeframe: Timeframe) -> HubEvent {
        HubEvent::Candle {
            coin: coin.to_string(),
            timeframe,
            candle: Candle::flat(1_700_000_040_000, 100.0),
        }
    }

    #[test]
    fn test_frame_filters_coin_and_timeframe() {
        let sub = sub();
        assert!(sub.frame(&candle_event("ETH", Timeframe::M1)).is_none());
        assert!(sub.frame(&candle_event("BTC", Timeframe::H1)).is_none());

        let frame = sub.frame(&candle_event("BTC", Timeframe::M1)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "candle");
        assert_eq!(value["timeframe"], "1m");
        assert_eq!(value["candle"]["close"], 100.0);
    }

    #[test]
    fn test_frame_groups_books() {
        let event = HubEvent::Book(BookSnapshot {
            coin: "BTC".to_string(),
            time: 1,
            bids: vec![BookLevel { px: 100_004.0, sz: 1.0 }],
            asks: vec![BookLevel { px: 100_016.0, sz: 2.0 }],
        });
        let frame = sub().frame(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "book");
        assert_eq!(value["spread"], 10.0);
        assert_eq!(value["bids"].as_array().unwrap().len(), 12);
        assert_eq!(value["asks"][0]["price"], 100_020.0);
    }

    #[test]
    fn test_frame_skips_mids() {
        let event = HubEvent::Mids {
            mids: Default::default(),
        };
        assert!(sub().frame(&event).is_none());
    }
}
