//! Service wiring and the process lifecycle.
//!
//! Builds every external client once, hands them to the HTTP server as
//! trait objects, and runs the upstream WebSocket feed and market hub
//! alongside the server until Ctrl-C.

use crate::config::AppConfig;
use crate::error::AppResult;
use perpsvc_auth::SessionSigner;
use perpsvc_custody::{Envelope, WalletProvisioner};
use perpsvc_ledger::{HeliusClient, RpcClient, WalletLedger};
use perpsvc_market::{Backfiller, HyperliquidCandleSource, MarketHub};
use perpsvc_server::{run_server, AppState, Services};
use perpsvc_store::{DynStore, MemoryStore, PgStore};
use perpsvc_venue::{
    DriftTrader, DynHyperliquidApi, HttpDriftGateway, HyperliquidClient, HyperliquidTrader,
    JupiterClient, Swapper,
};
use perpsvc_ws::{ConnectionManager, WsMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Upstream messages buffered between the socket and the hub.
const FEED_CAPACITY: usize = 4096;

pub struct Application {
    config: AppConfig,
    state: AppState,
    hub: Arc<MarketHub>,
}

async fn open_store(config: &AppConfig) -> AppResult<DynStore> {
    if config.database.url.trim().is_empty() {
        warn!("database.url is empty, using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PgStore::connect(&config.database.url, config.database.max_connections).await?;
    Ok(Arc::new(store))
}

impl Application {
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let store = open_store(&config).await?;
        let envelope = Arc::new(Envelope::from_config(&config.custody.kek)?);
        let sessions = SessionSigner::new(config.session.secret.as_bytes().to_vec())?;

        let rpc = Arc::new(RpcClient::new(config.solana.rpc_url.clone()));
        let ledger = Arc::new(WalletLedger::new(rpc));
        if config.helius.api_key.is_none() {
            warn!("No Helius API key configured, account activity will be unavailable");
        }
        let activity = Arc::new(HeliusClient::new(
            config.helius.api_url.clone(),
            config.helius.api_key.clone(),
        )?);

        let hl_api: DynHyperliquidApi = Arc::new(HyperliquidClient::new(&config.hyperliquid.api_url)?);
        let drift = DriftTrader::new(Arc::new(HttpDriftGateway::new(&config.drift.gateway_url)?));
        let swapper = Swapper::new(
            Arc::new(JupiterClient::new(&config.jupiter.api_url)?),
            ledger.clone(),
        );

        let hub = Arc::new(MarketHub::new());
        let services = Services {
            wallets: WalletProvisioner::new(store.clone(), envelope),
            store,
            sessions,
            ledger,
            activity,
            hyperliquid: HyperliquidTrader::new(hl_api.clone(), config.hyperliquid.is_mainnet),
            drift,
            swapper,
            hub: hub.clone(),
            backfiller: Backfiller::new(Arc::new(HyperliquidCandleSource::new(hl_api))),
        };

        info!(
            rpc_url = %config.solana.rpc_url,
            hyperliquid = %config.hyperliquid.api_url,
            mainnet = config.hyperliquid.is_mainnet,
            drift_gateway = %config.drift.gateway_url,
            coins = ?config.market.coins,
            "Services initialized"
        );

        let state = AppState::new(config.server.clone(), config.policy(), services);
        Ok(Self { config, state, hub })
    }

    /// Run the feed, hub and HTTP server until Ctrl-C or a server failure.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let (feed_tx, feed_rx) = mpsc::channel::<WsMessage>(FEED_CAPACITY);

        let manager = Arc::new(ConnectionManager::new(self.config.connection_config(), feed_tx));
        self.hub.attach_upstream(manager.subscribe_handle());
        let ws_task = {
            let manager = manager.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.connect().await {
                    error!(error = %e, "Upstream WebSocket stopped");
                }
            })
        };
        let hub_task = tokio::spawn(self.hub.clone().run(feed_rx, shutdown.clone()));
        let mut server_task = tokio::spawn(run_server(self.state.clone(), shutdown.clone()));

        let server_result = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                None
            }
            result = &mut server_task => Some(result),
        };

        shutdown.cancel();
        manager.shutdown();

        let server_result = match server_result {
            Some(result) => result,
            None => server_task.await,
        };
        let _ = ws_task.await;
        let _ = hub_task.await;

        match server_result {
            Ok(Ok(())) => {
                info!("Shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(e) => {
                error!(error = %e, "Server task panicked");
                Err(std::io::Error::other(e.to_string()).into())
            }
        }
    }
}
