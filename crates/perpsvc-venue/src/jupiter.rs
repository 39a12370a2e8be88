//! Jupiter swap aggregator: quotes, SOL/USDC rates and custodial swaps.

use crate::error::{ClientError, ClientResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use perpsvc_core::{BoxFuture, Token};
use perpsvc_custody::CustodialKeypair;
use perpsvc_ledger::tx::sign_serialized;
use perpsvc_ledger::{parse_pubkey, WalletLedger};
use perpsvc_telemetry::Metrics;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_JUPITER_URL: &str = "https://quote-api.jup.ag/v6";

/// Slippage for indicative rates.
pub const RATE_SLIPPAGE_BPS: u16 = 50;
/// Slippage for executed swaps.
pub const SWAP_SLIPPAGE_BPS: u16 = 100;
pub const PRIORITIZATION_FEE_LAMPORTS: u64 = 1_000_000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A route quote. `raw` is passed back verbatim to `/swap`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub raw: Value,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
}

impl Quote {
    /// Amounts arrive as decimal strings.
    pub fn from_value(raw: Value) -> ClientResult<Self> {
        let amount = |key: &str| -> ClientResult<u64> {
            match raw.get(key) {
                Some(Value::String(s)) => s
                    .parse()
                    .map_err(|_| ClientError::Decode(format!("{key} is not an integer: {s}"))),
                Some(Value::Number(n)) => n
                    .as_u64()
                    .ok_or_else(|| ClientError::Decode(format!("{key} out of range"))),
                _ => Err(ClientError::Decode(format!("quote missing {key}"))),
            }
        };
        let in_amount = amount("inAmount")?;
        let out_amount = amount("outAmount")?;
        let price_impact_pct = match raw.get("priceImpactPct") {
            Some(Value::String(s)) => s.parse().unwrap_or(0.0),
            Some(v) => v.as_f64().unwrap_or(0.0),
            None => 0.0,
        };
        Ok(Self {
            raw,
            in_amount,
            out_amount,
            price_impact_pct,
        })
    }
}

pub trait SwapApi: Send + Sync {
    fn quote<'a>(
        &'a self,
        input_mint: &'a str,
        output_mint: &'a str,
        amount: u64,
        slippage_bps: u16,
    ) -> BoxFuture<'a, ClientResult<Quote>>;

    /// Unsigned base64 transaction executing `quote` for `user`.
    fn swap_transaction<'a>(&'a self, quote: &'a Quote, user: &'a str) -> BoxFuture<'a, ClientResult<String>>;
}

pub type DynSwapApi = Arc<dyn SwapApi>;

pub struct JupiterClient {
    client: Client,
    base_url: String,
}

impl JupiterClient {
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

    async fn read(response: reqwest::Response, label: &str) -> ClientResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, request = label, "Jupiter request failed");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(format!("Failed to parse response: {e}")))
    }

    async fn fetch_quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> ClientResult<Quote> {
        let started = Instant::now();
        let response = self
            .client
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", input_mint.to_string()),
                ("outputMint", output_mint.to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", slippage_bps.to_string()),
            ])
            .send()
            .await?;
        Metrics::upstream_latency("jupiter", started.elapsed().as_secs_f64() * 1000.0);
        Quote::from_value(Self::read(response, "quote").await?)
    }

    async fn fetch_swap(&self, quote: &Quote, user: &str) -> ClientResult<String> {
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user,
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
            "prioritizationFeeLamports": PRIORITIZATION_FEE_LAMPORTS,
        });
        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await?;
        Metrics::upstream_latency("jupiter", started.elapsed().as_secs_f64() * 1000.0);
        let body = Self::read(response, "swap").await?;
        body.get("swapTransaction")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("swap response missing swapTransaction".to_string()))
    }
}

impl SwapApi for JupiterClient {
    fn quote<'a>(
        &'a self,
        input_mint: &'a str,
        output_mint: &'a str,
        amount: u64,
        slippage_bps: u16,
    ) -> BoxFuture<'a, ClientResult<Quote>> {
        Box::pin(self.fetch_quote(input_mint, output_mint, amount, slippage_bps))
    }

    fn swap_transaction<'a>(&'a self, quote: &'a Quote, user: &'a str) -> BoxFuture<'a, ClientResult<String>> {
        Box::pin(self.fetch_swap(quote, user))
    }
}

/// Indicative price for one whole unit of `from`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    pub from_token: Token,
    pub to_token: Token,
    pub rate: f64,
    /// USD per SOL implied by the quote.
    pub sol_price: f64,
    pub usdc_price: f64,
    pub input_mint: &'static str,
    pub output_mint: &'static str,
    pub price_impact_pct: f64,
}

impl RateQuote {
    pub fn from_quote(from: Token, to: Token, quote: &Quote) -> Self {
        let rate = to.from_base_units(quote.out_amount);
        let sol_price = match (from, to) {
            (Token::Sol, _) => rate,
            (_, Token::Sol) if rate > 0.0 => 1.0 / rate,
            _ => 0.0,
        };
        Self {
            from_token: from,
            to_token: to,
            rate,
            sol_price,
            usdc_price: 1.0,
            input_mint: from.mint(),
            output_mint: to.mint(),
            price_impact_pct: quote.price_impact_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapReceipt {
    pub signature: String,
    pub input_amount: f64,
    pub output_amount: f64,
    pub input_token: Token,
    pub output_token: Token,
}

/// Quotes through Jupiter and settles swaps from custodial wallets.
pub struct Swapper {
    api: DynSwapApi,
    ledger: Arc<WalletLedger>,
}

impl Swapper {
    pub fn new(api: DynSwapApi, ledger: Arc<WalletLedger>) -> Self {
        Self { api, ledger }
    }

    pub async fn rate(&self, from: Token, to: Token) -> ClientResult<RateQuote> {
        let quote = self
            .api
            .quote(from.mint(), to.mint(), from.unit(), RATE_SLIPPAGE_BPS)
            .await?;
        Ok(RateQuote::from_quote(from, to, &quote))
    }

    /// Swap `amount` whole units of `from`; signs, sends and waits for confirmation.
    pub async fn swap(&self, keypair: &CustodialKeypair, from: Token, to: Token, amount: f64) -> ClientResult<SwapReceipt> {
        let result = self.execute(keypair, from, to, amount).await;
        Metrics::swap(if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn execute(&self, keypair: &CustodialKeypair, from: Token, to: Token, amount: f64) -> ClientResult<SwapReceipt> {
        let units = from.to_base_units(amount);
        if units == 0 {
            return Err(ClientError::Rejected(format!("swap amount {amount} rounds to zero")));
        }
        let quote = self
            .api
            .quote(from.mint(), to.mint(), units, SWAP_SLIPPAGE_BPS)
            .await?;

        let user = keypair.public_key_b58();
        let encoded = self.api.swap_transaction(&quote, &user).await?;
        let unsigned = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ClientError::Decode(format!("swap transaction is not base64: {e}")))?;
        let signed = sign_serialized(&unsigned, &keypair.solana_keypair())?;
        let signature = self.ledger.submit_and_confirm(signed).await?;

        info!(%user, %from, %to, in_amount = quote.in_amount, out_amount = quote.out_amount, %signature, "Swap confirmed");
        Ok(SwapReceipt {
            signature,
            input_amount: from.from_base_units(quote.in_amount),
            output_amount: to.from_base_units(quote.out_amount),
            input_token: from,
            output_token: to,
        })
    }
}

/// Quotes at a fixed rate and hands back a transaction the user alone must sign.
#[derive(Default)]
pub struct FakeSwapApi {
    /// Output base units per input base unit.
    rate: Mutex<f64>,
    failure: Mutex<Option<String>>,
    quotes: Mutex<Vec<(String, String, u64, u16)>>,
}

impl FakeSwapApi {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: Mutex::new(rate),
            ..Default::default()
        }
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn quotes(&self) -> Vec<(String, String, u64, u16)> {
        self.quotes.lock().clone()
    }
}

impl SwapApi for FakeSwapApi {
    fn quote<'a>(
        &'a self,
        input_mint: &'a str,
        output_mint: &'a str,
        amount: u64,
        slippage_bps: u16,
    ) -> BoxFuture<'a, ClientResult<Quote>> {
        Box::pin(async move {
            if let Some(message) = self.failure.lock().clone() {
                return Err(ClientError::Status { status: 400, body: message });
            }
            self.quotes
                .lock()
                .push((input_mint.to_string(), output_mint.to_string(), amount, slippage_bps));
            let out = (amount as f64 * *self.rate.lock()).floor() as u64;
            Quote::from_value(json!({
                "inputMint": input_mint,
                "outputMint": output_mint,
                "inAmount": amount.to_string(),
                "outAmount": out.to_string(),
                "priceImpactPct": "0.001",
            }))
        })
    }

    fn swap_transaction<'a>(&'a self, _quote: &'a Quote, user: &'a str) -> BoxFuture<'a, ClientResult<String>> {
        Box::pin(async move {
            let payer = parse_pubkey(user)?;
            let ix = solana_system_interface::instruction::transfer(&payer, &payer, 0);
            let tx = VersionedTransaction {
                signatures: vec![Signature::default()],
                message: VersionedMessage::Legacy(Message::new(&[ix], Some(&payer))),
            };
            let raw = bincode::serialize(&tx).map_err(|e| ClientError::Decode(e.to_string()))?;
            Ok(STANDARD.encode(raw))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsvc_ledger::FakeRpc;

    #[test]
    fn test_quote_parses_string_amounts() {
        let quote = Quote::from_value(json!({
            "inAmount": "1000000000",
            "outAmount": "151230000",
            "priceImpactPct": "0.0012"
        }))
        .unwrap();
        assert_eq!(quote.in_amount, 1_000_000_000);
        assert_eq!(quote.out_amount, 151_230_000);
        assert!((quote.price_impact_pct - 0.0012).abs() < 1e-12);

        assert!(Quote::from_value(json!({"inAmount": "1"})).is_err());
    }

    #[test]
    fn test_rate_quote_sol_price() {
        let quote = Quote::from_value(json!({"inAmount": "1000000000", "outAmount": "150000000"})).unwrap();
        let rate = RateQuote::from_quote(Token::Sol, Token::Usdc, &quote);
        assert_eq!(rate.rate, 150.0);
        assert_eq!(rate.sol_price, 150.0);

        let quote = Quote::from_value(json!({"inAmount": "1000000", "outAmount": "5000000"})).unwrap();
        let rate = RateQuote::from_quote(Token::Usdc, Token::Sol, &quote);
        assert_eq!(rate.rate, 0.005);
        assert_eq!(rate.sol_price, 200.0);
        assert_eq!(rate.input_mint, Token::USDC_MINT);

        let json = serde_json::to_value(&rate).unwrap();
        assert_eq!(json["fromToken"], "USDC");
        assert_eq!(json["usdcPrice"], 1.0);
    }

    #[tokio::test]
    async fn test_rate_uses_one_unit_and_rate_slippage() {
        let api = Arc::new(FakeSwapApi::new(0.15));
        let ledger = Arc::new(WalletLedger::new(Arc::new(FakeRpc::new())));
        let swapper = Swapper::new(api.clone(), ledger);

        let rate = swapper.rate(Token::Sol, Token::Usdc).await.unwrap();
        assert_eq!(rate.rate, 150.0);
        let quotes = api.quotes();
        assert_eq!(quotes[0].2, 1_000_000_000);
        assert_eq!(quotes[0].3, RATE_SLIPPAGE_BPS);
    }

    #[tokio::test]
    async fn test_swap_signs_and_submits() {
        let api = Arc::new(FakeSwapApi::new(0.15));
        let rpc = Arc::new(FakeRpc::new());
        let ledger = Arc::new(WalletLedger::new(rpc.clone()).with_confirmation(2, Duration::from_millis(1)));
        let swapper = Swapper::new(api.clone(), ledger);
        let keypair = CustodialKeypair::generate();

        let receipt = swapper
            .swap(&keypair, Token::Sol, Token::Usdc, 0.5)
            .await
            .unwrap();
        assert_eq!(receipt.input_amount, 0.5);
        assert_eq!(receipt.output_amount, 75.0);
        assert_eq!(api.quotes()[0].3, SWAP_SLIPPAGE_BPS);

        let sent = rpc.sent();
        assert_eq!(sent.len(), 1);
        assert_ne!(sent[0].signatures[0], Signature::default());
        assert!(sent[0].verify_with_results().iter().all(|ok| *ok));
        assert_eq!(receipt.signature, sent[0].signatures[0].to_string());
    }

    #[tokio::test]
    async fn test_quote_failure_surfaces() {
        let api = Arc::new(FakeSwapApi::new(0.15));
        api.fail_with("No routes found");
        let ledger = Arc::new(WalletLedger::new(Arc::new(FakeRpc::new())));
        let swapper = Swapper::new(api, ledger);
        let err = swapper
            .swap(&CustodialKeypair::generate(), Token::Usdc, Token::Sol, 10.0)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
