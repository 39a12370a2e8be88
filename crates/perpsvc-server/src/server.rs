//! Router assembly and the HTTP listener.

use crate::gate::page_gate;
use crate::routes::{account, auth, exchange, market, trading, wallet};
use crate::state::AppState;
use crate::stream::stream_handler;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use perpsvc_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/nonce", get(auth::nonce))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/wallet/create", post(wallet::create))
        .route("/wallet/balance", get(wallet::balance))
        .route("/wallet/fee", get(wallet::fee))
        .route("/wallet/max-withdraw", get(wallet::max_withdraw))
        .route("/wallet/withdraw", post(wallet::withdraw))
        .route("/wallet/update-address1", post(wallet::update_address1))
        .route("/wallet/upsert", post(wallet::upsert))
        .route("/account/overview", get(account::overview))
        .route("/account/activity", get(account::activity))
        .route(
            "/account/baseline",
            get(account::get_baseline).post(account::set_baseline),
        )
        .route(
            "/account/secret",
            get(account::get_secret).post(account::post_secret),
        )
        .route("/trading/place-order", post(trading::place_order))
        .route("/trading/cancel-order", post(trading::cancel_order))
        .route("/trading/active-orders", get(trading::active_orders))
        .route("/trading/positions", get(trading::positions_handler))
        .route("/trading/position-monitor", get(trading::position_monitor))
        .route("/trading/drift-place-order", post(trading::drift_place_order))
        .route("/trading/drift-init-user", post(trading::drift_init_user))
        .route("/exchange/rate", get(exchange::rate))
        .route("/exchange/swap", post(exchange::swap))
        .route("/market/orderbook", get(market::orderbook))
        .route("/market/candles", get(market::candles))
        .route("/market/mids", get(market::mids))
        .route("/market/stream", get(stream_handler))
        .fallback(api_not_found)
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .nest("/api", api_routes())
        .route("/metrics", get(metrics))
        .route("/health", get(health));

    let router = match state.config.static_dir.as_deref() {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found),
    };

    router
        .layer(middleware::from_fn_with_state(state.clone(), page_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn api_not_found() -> crate::error::ApiError {
    crate::error::ApiError::not_found()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn metrics() -> Response {
    match Metrics::gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match state.services.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response()
        }
    }
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let addr = state.config.addr();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
