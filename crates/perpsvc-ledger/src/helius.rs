//! Account activity from the Helius enhanced-transactions API.

use crate::error::{LedgerError, LedgerResult};
use perpsvc_core::BoxFuture;
use parking_lot::Mutex;
use perpsvc_telemetry::Metrics;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_HELIUS_URL: &str = "https://api.helius.xyz";
/// Transactions fetched per request.
pub const ACTIVITY_LIMIT: usize = 50;
/// Net SOL movement below this is not a deposit or withdraw.
const SOL_EPSILON: f64 = 0.000_000_1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Deposit,
    Withdraw,
    Buy,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub signature: String,
    /// Milliseconds since epoch.
    pub ts: i64,
    pub sol_delta: f64,
    pub kind: ActivityKind,
}

pub trait ActivityApi: Send + Sync {
    /// Raw enhanced transactions for an address, newest first.
    fn transactions<'a>(&'a self, address: &'a str, limit: usize) -> BoxFuture<'a, LedgerResult<Vec<Value>>>;
}

pub type DynActivityApi = Arc<dyn ActivityApi>;

pub struct HeliusClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HeliusClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

impl ActivityApi for HeliusClient {
    fn transactions<'a>(&'a self, address: &'a str, limit: usize) -> BoxFuture<'a, LedgerResult<Vec<Value>>> {
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or(LedgerError::MissingConfig("missing_helius_api_key"))?;

            let url = format!("{}/v0/addresses/{address}/transactions", self.base_url);
            let limit = limit.to_string();
            let started = Instant::now();
            let response = self
                .client
                .get(&url)
                .query(&[("api-key", api_key), ("limit", limit.as_str())])
                .send()
                .await
                .map_err(|e| LedgerError::Http(format!("HTTP request failed: {e}")))?;
            Metrics::upstream_latency("helius", started.elapsed().as_secs_f64() * 1000.0);

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LedgerError::Upstream {
                    service: "helius",
                    status: status.as_u16(),
                    body,
                });
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| LedgerError::Decode(format!("Failed to parse response: {e}")))?;
            debug!(address, "Fetched enhanced transactions");
            Ok(match body {
                Value::Array(items) => items,
                _ => Vec::new(),
            })
        })
    }
}

/// Canned activity for tests.
#[derive(Debug, Default)]
pub struct FakeActivity {
    txs: Mutex<Vec<Value>>,
    error: Mutex<Option<u16>>,
    missing_key: Mutex<bool>,
}

impl FakeActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transactions(&self, txs: Vec<Value>) {
        *self.txs.lock() = txs;
    }

    pub fn fail_with_status(&self, status: u16) {
        *self.error.lock() = Some(status);
    }

    pub fn without_api_key(&self) {
        *self.missing_key.lock() = true;
    }
}

impl ActivityApi for FakeActivity {
    fn transactions<'a>(&'a self, _address: &'a str, limit: usize) -> BoxFuture<'a, LedgerResult<Vec<Value>>> {
        Box::pin(async move {
            if *self.missing_key.lock() {
                return Err(LedgerError::MissingConfig("missing_helius_api_key"));
            }
            if let Some(status) = *self.error.lock() {
                return Err(LedgerError::Upstream {
                    service: "helius",
                    status,
                    body: String::new(),
                });
            }
            Ok(self.txs.lock().iter().take(limit).cloned().collect())
        })
    }
}

/// Classify enhanced transactions for `address`, newest first.
pub fn parse_activity(address: &str, txs: &[Value], now_ms: i64) -> Vec<ActivityEntry> {
    let mut list: Vec<ActivityEntry> = txs
        .iter()
        .map(|tx| {
            let signature = ["signature", "transactionSignature", "sig"]
                .iter()
                .find_map(|k| tx.get(*k).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            let ts = tx
                .get("timestamp")
                .and_then(Value::as_f64)
                .map(|secs| (secs * 1000.0) as i64)
                .unwrap_or(now_ms);

            let mut delta_lamports: i128 = 0;
            for nt in tx
                .get("nativeTransfers")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let amount = nt.get("amount").and_then(Value::as_u64).unwrap_or(0) as i128;
                if nt.get("toUserAccount").and_then(Value::as_str) == Some(address) {
                    delta_lamports += amount;
                }
                if nt.get("fromUserAccount").and_then(Value::as_str) == Some(address) {
                    delta_lamports -= amount;
                }
            }
            let sol_delta = delta_lamports as f64 / 1e9;

            let tx_type = tx
                .get("type")
                .or_else(|| tx.get("transactionType"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase();
            let incoming_token = tx
                .get("tokenTransfers")
                .and_then(Value::as_array)
                .is_some_and(|tts| {
                    tts.iter()
                        .any(|tt| tt.get("toUserAccount").and_then(Value::as_str) == Some(address))
                });

            let kind = if sol_delta > SOL_EPSILON {
                ActivityKind::Deposit
            } else if sol_delta < -SOL_EPSILON {
                ActivityKind::Withdraw
            } else if tx_type.contains("swap") || tx_type.contains("exchange") || incoming_token {
                ActivityKind::Buy
            } else {
                ActivityKind::Other
            };

            ActivityEntry {
                signature,
                ts,
                sol_delta,
                kind,
            }
        })
        .collect();

    list.sort_by(|a, b| b.ts.cmp(&a.ts));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ME: &str = "CustodialAddr1111";

    #[test]
    fn test_classification() {
        let txs = vec![
            json!({"signature": "dep", "timestamp": 100, "nativeTransfers": [
                {"fromUserAccount": "X", "toUserAccount": ME, "amount": 2_000_000_000u64}
            ]}),
            json!({"signature": "wd", "timestamp": 200, "nativeTransfers": [
                {"fromUserAccount": ME, "toUserAccount": "Y", "amount": 500_000_000u64}
            ]}),
            json!({"signature": "swap", "timestamp": 300, "type": "SWAP"}),
            json!({"signature": "tok", "timestamp": 50, "tokenTransfers": [{"toUserAccount": ME}]}),
            json!({"signature": "dust", "timestamp": 10, "nativeTransfers": [
                {"fromUserAccount": "X", "toUserAccount": ME, "amount": 10}
            ]}),
        ];

        let activity = parse_activity(ME, &txs, 0);
        let kinds: Vec<_> = activity.iter().map(|a| (a.signature.as_str(), a.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("swap", ActivityKind::Buy),
                ("wd", ActivityKind::Withdraw),
                ("dep", ActivityKind::Deposit),
                ("tok", ActivityKind::Buy),
                ("dust", ActivityKind::Other),
            ]
        );
        assert_eq!(activity[1].sol_delta, -0.5);
        assert_eq!(activity[2].ts, 100_000);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let client = HeliusClient::new(DEFAULT_HELIUS_URL, Some(String::new())).unwrap();
        let err = tokio_test::block_on(client.transactions(ME, ACTIVITY_LIMIT)).unwrap_err();
        assert_eq!(err.code(), "missing_helius_api_key");
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = ActivityEntry {
            signature: "s".to_string(),
            ts: 1,
            sol_delta: 0.5,
            kind: ActivityKind::Deposit,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["solDelta"], 0.5);
        assert_eq!(json["kind"], "deposit");
    }
}
