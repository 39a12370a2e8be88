//! Drift order submission through a self-hosted Drift Gateway.
//!
//! The gateway holds a delegate key for each custodial authority; calls are
//! scoped by `subAccountId`.

use super::params::DriftOrderParams;
use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use perpsvc_core::BoxFuture;
use perpsvc_ledger::Pubkey;
use perpsvc_telemetry::Metrics;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait DriftGateway: Send + Sync {
    /// Place one perp order; returns the transaction signature.
    fn place_order<'a>(
        &'a self,
        authority: &'a Pubkey,
        sub_account: u16,
        params: &'a DriftOrderParams,
    ) -> BoxFuture<'a, ClientResult<String>>;

    /// Whether the user account for `authority`/`sub_account` exists on chain.
    fn user_exists<'a>(&'a self, authority: &'a Pubkey, sub_account: u16) -> BoxFuture<'a, ClientResult<bool>>;
}

pub type DynDriftGateway = Arc<dyn DriftGateway>;

/// Signature field in a gateway order response.
fn parse_signature(body: &Value) -> ClientResult<String> {
    body.get("tx")
        .or_else(|| body.get("signature"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::Decode(format!("no signature in gateway response: {body}")))
}

pub struct HttpDriftGateway {
    client: Client,
    base_url: String,
}

impl HttpDriftGateway {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn place(&self, authority: &Pubkey, sub_account: u16, params: &DriftOrderParams) -> ClientResult<String> {
        let url = format!("{}/v2/orders?subAccountId={sub_account}", self.base_url);
        let body = json!({ "orders": [params.to_gateway_order()] });

        let started = Instant::now();
        let response = self.client.post(&url).json(&body).send().await?;
        Metrics::upstream_latency("drift", started.elapsed().as_secs_f64() * 1000.0);

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(%status, %authority, sub_account, "Drift gateway rejected order");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        let body: Value = serde_json::from_str(&text)?;
        debug!(%authority, sub_account, "Drift order accepted");
        parse_signature(&body)
    }

    async fn exists(&self, authority: &Pubkey, sub_account: u16) -> ClientResult<bool> {
        let url = format!("{}/v2/positions?subAccountId={sub_account}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        let lower = body.to_ascii_lowercase();
        if status.as_u16() == 404 || lower.contains("not found") || lower.contains("accountnotinitialized") {
            debug!(%authority, sub_account, "Drift user account not found");
            return Ok(false);
        }
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl DriftGateway for HttpDriftGateway {
    fn place_order<'a>(
        &'a self,
        authority: &'a Pubkey,
        sub_account: u16,
        params: &'a DriftOrderParams,
    ) -> BoxFuture<'a, ClientResult<String>> {
        Box::pin(self.place(authority, sub_account, params))
    }

    fn user_exists<'a>(&'a self, authority: &'a Pubkey, sub_account: u16) -> BoxFuture<'a, ClientResult<bool>> {
        Box::pin(self.exists(authority, sub_account))
    }
}

/// In-memory gateway for tests and offline runs.
#[derive(Default)]
pub struct FakeDriftGateway {
    users: Mutex<HashSet<(Pubkey, u16)>>,
    placed: Mutex<Vec<(Pubkey, u16, DriftOrderParams)>>,
    failure: Mutex<Option<String>>,
}

impl FakeDriftGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, authority: Pubkey, sub_account: u16) {
        self.users.lock().insert((authority, sub_account));
    }

    /// Every order fails with this venue message.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn placed(&self) -> Vec<(Pubkey, u16, DriftOrderParams)> {
        self.placed.lock().clone()
    }
}

impl DriftGateway for FakeDriftGateway {
    fn place_order<'a>(
        &'a self,
        authority: &'a Pubkey,
        sub_account: u16,
        params: &'a DriftOrderParams,
    ) -> BoxFuture<'a, ClientResult<String>> {
        Box::pin(async move {
            if let Some(message) = self.failure.lock().clone() {
                return Err(ClientError::Rejected(message));
            }
            if !self.users.lock().contains(&(*authority, sub_account)) {
                return Err(ClientError::Rejected(format!(
                    "User account does not exist for subaccount {sub_account}"
                )));
            }
            let mut placed = self.placed.lock();
            placed.push((*authority, sub_account, params.clone()));
            Ok(format!("drift-sig-{}", placed.len()))
        })
    }

    fn user_exists<'a>(&'a self, authority: &'a Pubkey, sub_account: u16) -> BoxFuture<'a, ClientResult<bool>> {
        Box::pin(async move { Ok(self.users.lock().contains(&(*authority, sub_account))) })
    }
}
