//! `SolanaRpc` over the nonblocking `solana-client` RPC client.

use crate::error::{LedgerError, LedgerResult};
use crate::rpc::{SignatureInfo, SignatureStatus, SolanaRpc, TransactionMeta};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use perpsvc_core::BoxFuture;
use perpsvc_telemetry::Metrics;
use serde_json::{json, Value};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient as NonblockingRpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_response::Response;
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Public mainnet endpoint used when none is configured.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

pub struct RpcClient {
    inner: NonblockingRpcClient,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: NonblockingRpcClient::new_with_timeout_and_commitment(
                url.into(),
                DEFAULT_TIMEOUT,
                CommitmentConfig::confirmed(),
            ),
        }
    }

    /// Await one RPC call, recording latency and logging failures.
    async fn timed<T>(method: &'static str, call: impl Future<Output = Result<T, ClientError>>) -> LedgerResult<T> {
        let started = Instant::now();
        let result = call.await;
        Metrics::upstream_latency("solana_rpc", started.elapsed().as_secs_f64() * 1000.0);
        result.map_err(|e| {
            warn!(method, error = %e, "RPC error");
            LedgerError::from(e)
        })
    }
}

fn parse_signature(signature: &str) -> LedgerResult<Signature> {
    Signature::from_str(signature).map_err(|e| LedgerError::Decode(format!("signature {signature}: {e}")))
}

/// Sum `tokenAmount.amount` over a `getTokenAccountsByOwner` (jsonParsed) result.
fn sum_token_amounts(accounts: &[Value]) -> u64 {
    accounts
        .iter()
        .filter_map(|a| {
            a.pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<u64>().ok())
        })
        .sum()
}

/// Pull key list and balances out of a `getTransaction` (json encoding) result.
fn parse_transaction_meta(tx: &Value) -> Option<TransactionMeta> {
    let keys = tx
        .pointer("/transaction/message/accountKeys")?
        .as_array()?
        .iter()
        .filter_map(|k| {
            k.as_str()
                .map(str::to_string)
                .or_else(|| k.get("pubkey").and_then(Value::as_str).map(str::to_string))
        })
        .collect();

    let balances = |name: &str| -> Vec<u64> {
        tx.pointer(&format!("/meta/{name}"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default()
    };

    Some(TransactionMeta {
        block_time: tx.get("blockTime").and_then(Value::as_i64),
        account_keys: keys,
        pre_balances: balances("preBalances"),
        post_balances: balances("postBalances"),
    })
}

impl SolanaRpc for RpcClient {
    fn get_balance(&self, key: Pubkey) -> BoxFuture<'_, LedgerResult<u64>> {
        Box::pin(async move { Self::timed("getBalance", self.inner.get_balance(&key)).await })
    }

    fn get_token_balance(&self, owner: Pubkey, mint: Pubkey) -> BoxFuture<'_, LedgerResult<u64>> {
        Box::pin(async move {
            let params = json!([
                owner.to_string(),
                {"mint": mint.to_string()},
                {"encoding": "jsonParsed", "commitment": "confirmed"}
            ]);
            let res: Response<Vec<Value>> = Self::timed(
                "getTokenAccountsByOwner",
                self.inner.send(RpcRequest::GetTokenAccountsByOwner, params),
            )
            .await?;
            Ok(sum_token_amounts(&res.value))
        })
    }

    fn get_latest_blockhash(&self) -> BoxFuture<'_, LedgerResult<Hash>> {
        Box::pin(async move { Self::timed("getLatestBlockhash", self.inner.get_latest_blockhash()).await })
    }

    fn get_fee_for_message(&self, message: Message) -> BoxFuture<'_, LedgerResult<Option<u64>>> {
        // The typed helper turns a null fee into an error; an expired blockhash should read as None.
        Box::pin(async move {
            let params = json!([BASE64_STANDARD.encode(message.serialize()), {"commitment": "confirmed"}]);
            let res: Response<Option<u64>> = Self::timed(
                "getFeeForMessage",
                self.inner.send(RpcRequest::GetFeeForMessage, params),
            )
            .await?;
            Ok(res.value)
        })
    }

    fn send_transaction(&self, tx: VersionedTransaction) -> BoxFuture<'_, LedgerResult<String>> {
        Box::pin(async move {
            let config = RpcSendTransactionConfig {
                preflight_commitment: Some(CommitmentLevel::Confirmed),
                ..Default::default()
            };
            let signature = Self::timed(
                "sendTransaction",
                self.inner.send_transaction_with_config(&tx, config),
            )
            .await?;
            debug!(%signature, "Transaction submitted");
            Ok(signature.to_string())
        })
    }

    fn get_signature_status<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, LedgerResult<Option<SignatureStatus>>> {
        Box::pin(async move {
            let signature = parse_signature(signature)?;
            let res = Self::timed(
                "getSignatureStatuses",
                self.inner.get_signature_statuses(&[signature]),
            )
            .await?;
            Ok(res.value.into_iter().next().flatten().map(|s| SignatureStatus {
                confirmed: s.satisfies_commitment(CommitmentConfig::confirmed()),
                err: s.err.as_ref().map(|e| format!("{e:?}")),
            }))
        })
    }

    fn get_signatures_for_address(&self, key: Pubkey, limit: usize) -> BoxFuture<'_, LedgerResult<Vec<SignatureInfo>>> {
        Box::pin(async move {
            let config = GetConfirmedSignaturesForAddress2Config {
                limit: Some(limit),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            };
            let raw = Self::timed(
                "getSignaturesForAddress",
                self.inner.get_signatures_for_address_with_config(&key, config),
            )
            .await?;
            Ok(raw
                .into_iter()
                .map(|s| SignatureInfo {
                    signature: s.signature,
                    block_time: s.block_time,
                })
                .collect())
        })
    }

    fn get_transaction<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, LedgerResult<Option<TransactionMeta>>> {
        Box::pin(async move {
            let params = json!([
                signature,
                {"encoding": "json", "maxSupportedTransactionVersion": 0, "commitment": "confirmed"}
            ]);
            let raw: Option<Value> =
                Self::timed("getTransaction", self.inner.send(RpcRequest::GetTransaction, params)).await?;
            Ok(raw.as_ref().and_then(parse_transaction_meta))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_token_amounts() {
        let accounts: Vec<Value> = serde_json::from_str(
            r#"[
                {"pubkey":"A","account":{"data":{"parsed":{"info":{"tokenAmount":{"amount":"1500000","decimals":6}}}}}},
                {"pubkey":"B","account":{"data":{"parsed":{"info":{"tokenAmount":{"amount":"250000","decimals":6}}}}}},
                {"pubkey":"C","account":{"data":["", "base64"]}}
            ]"#,
        )
        .unwrap();
        assert_eq!(sum_token_amounts(&accounts), 1_750_000);
        assert_eq!(sum_token_amounts(&[]), 0);
    }

    #[test]
    fn test_parse_transaction_meta() {
        let tx: Value = serde_json::from_str(
            r#"{
                "blockTime": 1700000000,
                "meta": {"preBalances": [10000000, 0, 1], "postBalances": [4995000, 5000000, 1]},
                "transaction": {"message": {"accountKeys": ["Sender111", "Receiver222", "11111111111111111111111111111111"]}}
            }"#,
        )
        .unwrap();
        let meta = parse_transaction_meta(&tx).unwrap();
        assert_eq!(meta.block_time, Some(1_700_000_000));
        assert_eq!(meta.account_keys[1], "Receiver222");
        assert_eq!(meta.pre_balances, vec![10_000_000, 0, 1]);
        assert_eq!(meta.post_balances[0], 4_995_000);
    }

    #[test]
    fn test_parse_signature() {
        assert!(parse_signature(&Signature::default().to_string()).is_ok());
        assert!(matches!(parse_signature("sig-1"), Err(LedgerError::Decode(_))));
    }
}
