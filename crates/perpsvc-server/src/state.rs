//! Shared handler state.

use crate::config::{Policy, ServerConfig};
use crate::limiter::{ConnectionLimiter, WindowLimiter};
use perpsvc_auth::{CookieOptions, SessionSigner};
use perpsvc_custody::WalletProvisioner;
use perpsvc_ledger::{DynActivityApi, WalletLedger};
use perpsvc_market::{Backfiller, MarketHub};
use perpsvc_store::DynStore;
use perpsvc_venue::{DriftTrader, HyperliquidTrader, Swapper};
use std::sync::Arc;

/// Everything handlers call out to. Built once by the binary.
pub struct Services {
    pub store: DynStore,
    pub sessions: SessionSigner,
    pub wallets: WalletProvisioner,
    pub ledger: Arc<WalletLedger>,
    pub activity: DynActivityApi,
    pub hyperliquid: HyperliquidTrader,
    pub drift: DriftTrader,
    pub swapper: Swapper,
    pub hub: Arc<MarketHub>,
    pub backfiller: Backfiller,
}

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub policy: Policy,
    pub services: Arc<Services>,
    pub positions_limiter: Arc<WindowLimiter>,
    pub stream_limiter: Arc<ConnectionLimiter>,
}

impl AppState {
    pub fn new(config: ServerConfig, policy: Policy, services: Services) -> Self {
        Self {
            positions_limiter: Arc::new(WindowLimiter::new(
                config.positions_limit,
                config.positions_window(),
            )),
            stream_limiter: Arc::new(ConnectionLimiter::new(config.max_stream_connections)),
            services: Arc::new(services),
            policy,
            config,
        }
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.secure_cookies,
        }
    }
}
