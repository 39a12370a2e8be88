//! Prometheus metrics for the perpsvc backend.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, IntGauge,
    TextEncoder,
};

/// Login attempts by result (ok/invalid_payload/invalid_nonce/bad_signature/error).
pub static LOGIN_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("perpsvc_login_total", "Login attempts by result", &["result"])
        .unwrap()
});

/// Custodial wallets by outcome (created/existing).
pub static WALLETS_PROVISIONED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpsvc_wallets_provisioned_total",
        "Custodial wallet provisioning calls",
        &["outcome"]
    )
    .unwrap()
});

/// Orders submitted. Labels: venue (hyperliquid/drift), outcome (ok/error).
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpsvc_orders_total",
        "Orders submitted to venues",
        &["venue", "outcome"]
    )
    .unwrap()
});

/// Venue errors by typed kind.
pub static VENUE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpsvc_venue_errors_total",
        "Venue errors by kind",
        &["venue", "kind"]
    )
    .unwrap()
});

/// Withdrawals by outcome (submitted/rejected/failed).
pub static WITHDRAWALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpsvc_withdrawals_total",
        "Withdrawal requests by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Swaps by outcome.
pub static SWAPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("perpsvc_swaps_total", "Jupiter swaps by outcome", &["outcome"])
        .unwrap()
});

/// Upstream call latency in milliseconds.
pub static UPSTREAM_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "perpsvc_upstream_latency_ms",
        "Upstream request latency in milliseconds",
        &["service"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Candle backfill completions by winning strategy.
pub static BACKFILL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpsvc_backfill_total",
        "Candle backfills by strategy that produced data",
        &["strategy"]
    )
    .unwrap()
});

/// WebSocket connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "perpsvc_ws_connected",
        "Upstream WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perpsvc_ws_state",
        "Upstream WebSocket state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpsvc_ws_reconnect_total",
        "Upstream WebSocket reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Browser market-stream clients currently connected.
pub static STREAM_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "perpsvc_stream_clients",
        "Connected market stream clients"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn login(result: &str) {
        LOGIN_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn wallet_provisioned(existed: bool) {
        let outcome = if existed { "existing" } else { "created" };
        WALLETS_PROVISIONED_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn order(venue: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        ORDERS_TOTAL.with_label_values(&[venue, outcome]).inc();
    }

    pub fn venue_error(venue: &str, kind: &str) {
        VENUE_ERRORS_TOTAL.with_label_values(&[venue, kind]).inc();
    }

    pub fn withdrawal(outcome: &str) {
        WITHDRAWALS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn swap(outcome: &str) {
        SWAPS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn upstream_latency(service: &str, latency_ms: f64) {
        UPSTREAM_LATENCY_MS
            .with_label_values(&[service])
            .observe(latency_ms);
    }

    pub fn backfill(strategy: &str) {
        BACKFILL_TOTAL.with_label_values(&[strategy]).inc();
    }

    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    /// Only the active state is set to 1.
    pub fn ws_state_set(state: &str) {
        for s in &["disconnected", "connecting", "connected", "reconnecting"] {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn stream_client_connected() {
        STREAM_CLIENTS.inc();
    }

    pub fn stream_client_disconnected() {
        STREAM_CLIENTS.dec();
    }

    /// Render the default registry in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
