//! Router-level tests against in-memory fakes.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use ed25519_dalek::{Signer, SigningKey};
use perpsvc_auth::{SessionSigner, NONCE_COOKIE, SESSION_COOKIE};
use perpsvc_custody::{Envelope, WalletProvisioner};
use perpsvc_ledger::{FakeActivity, FakeRpc, Pubkey, WalletLedger};
use perpsvc_market::{Backfiller, FakeCandleSource, MarketHub};
use perpsvc_server::{create_router, AppState, Policy, ServerConfig, Services};
use perpsvc_store::MemoryStore;
use perpsvc_venue::hyperliquid::L2Book;
use perpsvc_venue::{DriftTrader, FakeDriftGateway, FakeHyperliquid, FakeSwapApi, HyperliquidTrader, Swapper};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    router: Router,
    rpc: Arc<FakeRpc>,
    hyperliquid: Arc<FakeHyperliquid>,
    drift: Arc<FakeDriftGateway>,
    activity: Arc<FakeActivity>,
    user_key: SigningKey,
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

fn harness_with(config: ServerConfig, policy: Policy) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let rpc = Arc::new(FakeRpc::new());
    let hyperliquid = Arc::new(FakeHyperliquid::default());
    let drift = Arc::new(FakeDriftGateway::new());
    let activity = Arc::new(FakeActivity::new());
    let candles = Arc::new(FakeCandleSource::new());

    let ledger = Arc::new(WalletLedger::new(rpc.clone()).with_confirmation(1, Duration::from_millis(1)));
    let services = Services {
        store: store.clone(),
        sessions: SessionSigner::new(vec![42u8; 32]).unwrap(),
        wallets: WalletProvisioner::new(store, Arc::new(Envelope::from_key([9u8; 32]))),
        ledger: ledger.clone(),
        activity: activity.clone(),
        hyperliquid: HyperliquidTrader::new(hyperliquid.clone(), false),
        drift: DriftTrader::new(drift.clone()),
        swapper: Swapper::new(Arc::new(FakeSwapApi::new(0.15)), ledger),
        hub: Arc::new(MarketHub::new()),
        backfiller: Backfiller::new(candles),
    };
    Harness {
        router: create_router(AppState::new(config, policy, services)),
        rpc,
        hyperliquid,
        drift,
        activity,
        user_key: SigningKey::from_bytes(&[3u8; 32]),
    }
}

fn harness() -> Harness {
    harness_with(ServerConfig::default(), Policy::default())
}

fn cookie_pair(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

impl Harness {
    fn address(&self) -> String {
        bs58::encode(self.user_key.verifying_key().as_bytes()).into_string()
    }

    async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply { status, headers, body }
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Reply {
        let mut req = Request::get(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> Reply {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn nonce(&self) -> (String, String) {
        let reply = self.get("/api/auth/nonce", None).await;
        assert_eq!(reply.status, StatusCode::OK);
        let cookie = cookie_pair(&reply.headers, NONCE_COOKIE).unwrap();
        (reply.body["nonce"].as_str().unwrap().to_string(), cookie)
    }

    fn challenge(&self, nonce: &str) -> Value {
        let message = format!("Sign in to perpsvc\nNonce: {nonce}");
        let signature = self.user_key.sign(message.as_bytes());
        json!({
            "address": self.address(),
            "signature": bs58::encode(signature.to_bytes()).into_string(),
            "message": message,
        })
    }

    /// Signs in and returns the session cookie pair.
    async fn login(&self) -> String {
        let (nonce, cookie) = self.nonce().await;
        let reply = self.post("/api/auth/verify", Some(&cookie), self.challenge(&nonce)).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["userId"], self.address());
        cookie_pair(&reply.headers, SESSION_COOKIE).unwrap()
    }

    /// Signs in and provisions the custodial wallet.
    async fn login_with_wallet(&self) -> (String, Pubkey) {
        let session = self.login().await;
        let reply = self.post("/api/wallet/create", Some(&session), json!({})).await;
        assert_eq!(reply.status, StatusCode::OK);
        let key = reply.body["publicKey"].as_str().unwrap().parse().unwrap();
        (session, key)
    }
}

fn destination() -> String {
    Pubkey::from([5u8; 32]).to_string()
}

#[tokio::test]
async fn test_login_me_and_logout() {
    let h = harness();
    let session = h.login().await;

    let me = h.get("/api/me", Some(&session)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["userId"], h.address());
    assert_eq!(me.body["walletAddress"], h.address());
    assert!(me.body["custodialPublicKey"].is_null());
    assert_eq!(me.headers.get(header::CACHE_CONTROL).unwrap(), "no-store");

    let out = h.post("/api/auth/logout", Some(&session), json!({})).await;
    assert_eq!(out.status, StatusCode::OK);
    assert!(cookie_pair(&out.headers, SESSION_COOKIE).is_some());

    let me = h.get("/api/me", Some(&session)).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    assert_eq!(me.body["error"], "unauthorized");
}

#[tokio::test]
async fn test_verify_rejects_bad_nonce_and_signature() {
    let h = harness();
    let (nonce, cookie) = h.nonce().await;

    let reply = h.post("/api/auth/verify", None, h.challenge(&nonce)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_nonce");

    let mut tampered = h.challenge(&nonce);
    tampered["message"] = json!(format!("Nonce: {nonce} and more"));
    let reply = h.post("/api/auth/verify", Some(&cookie), tampered).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = h.post("/api/auth/verify", Some(&cookie), json!({"address": 1})).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_payload");
}

#[tokio::test]
async fn test_page_gate_redirects() {
    let h = harness();
    let reply = h.get("/", None).await;
    assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(reply.headers.get(header::LOCATION).unwrap(), "/login");

    let reply = h.get("/login", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let session = h.login().await;
    let reply = h.get("/login", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(reply.headers.get(header::LOCATION).unwrap(), "/");

    assert_eq!(h.get("/health", None).await.status, StatusCode::OK);
    assert_eq!(h.get("/metrics", None).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_wallet_create_is_idempotent() {
    let h = harness();
    let session = h.login().await;

    let first = h.post("/api/wallet/create", Some(&session), json!({})).await;
    assert_eq!(first.body["existed"], false);
    let second = h.post("/api/wallet/create", Some(&session), json!({})).await;
    assert_eq!(second.body["existed"], true);
    assert_eq!(first.body["publicKey"], second.body["publicKey"]);

    let other = h
        .post("/api/wallet/create", Some(&session), json!({"userId": "someone-else"}))
        .await;
    assert_eq!(other.status, StatusCode::FORBIDDEN);

    let me = h.get("/api/me", Some(&session)).await;
    assert_eq!(me.body["custodialPublicKey"], first.body["publicKey"]);
}

#[tokio::test]
async fn test_balance_and_withdraw() {
    let h = harness();
    let session = h.login().await;

    let empty = h.get("/api/wallet/balance", Some(&session)).await;
    assert_eq!(empty.body, json!({"lamports": 0, "sol": 0}));

    let (session, key) = h.login_with_wallet().await;
    h.rpc.set_balance(key, 20_000_000);
    let balance = h.get("/api/wallet/balance", Some(&session)).await;
    assert_eq!(balance.body["lamports"], 20_000_000);
    assert_eq!(balance.body["sol"], 0.02);

    let bad = h
        .post("/api/wallet/withdraw", Some(&session), json!({"to": "nope", "amountSol": 0.01}))
        .await;
    assert_eq!(bad.body["error"], "invalid_destination");

    let zero = h
        .post("/api/wallet/withdraw", Some(&session), json!({"to": destination(), "amountSol": 0}))
        .await;
    assert_eq!(zero.body["error"], "invalid_amount");

    let too_much = h
        .post("/api/wallet/withdraw", Some(&session), json!({"to": destination(), "amountSol": 0.02}))
        .await;
    assert_eq!(too_much.status, StatusCode::BAD_REQUEST);
    assert_eq!(too_much.body["error"], "insufficient_funds");
    assert!(h.rpc.sent().is_empty());

    let ok = h
        .post("/api/wallet/withdraw", Some(&session), json!({"to": destination(), "amountSol": 0.01}))
        .await;
    assert_eq!(ok.status, StatusCode::OK, "{}", ok.body);
    assert!(ok.body["signature"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(h.rpc.sent().len(), 1);
}

#[tokio::test]
async fn test_fee_and_max_withdraw() {
    let h = harness();
    let session = h.login().await;
    let reply = h.get("/api/wallet/fee", Some(&session)).await;
    assert_eq!(reply.body["error"], "no_wallet");

    let (session, key) = h.login_with_wallet().await;
    h.rpc.set_balance(key, 1_000_000);
    let fee = h.get("/api/wallet/fee?lamports=5000", Some(&session)).await;
    assert_eq!(fee.body["feeLamports"], 5000);

    let max = h
        .get(&format!("/api/wallet/max-withdraw?to={}", destination()), Some(&session))
        .await;
    assert_eq!(max.status, StatusCode::OK);
    let max_lamports = max.body["maxLamports"].as_u64().unwrap();
    let safe_fee = max.body["safeFeeLamports"].as_u64().unwrap();
    assert!(max_lamports + safe_fee <= 1_000_000);
    assert!(max_lamports > 0);

    let bad = h.get("/api/wallet/max-withdraw?to=xyz", Some(&session)).await;
    assert_eq!(bad.body["error"], "invalid_destination");
}

#[tokio::test]
async fn test_requires_session() {
    let h = harness();
    for uri in ["/api/wallet/balance", "/api/account/overview", "/api/trading/positions", "/api/exchange/rate"] {
        let reply = h.get(uri, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{uri}");
    }
    let reply = h.get("/api/market/mids", None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_place_order_flow() {
    let h = harness();
    let session = h.login().await;
    let order = json!({"symbol": "SOL-PERP", "side": "long", "type": "market", "sizeUsd": 50});

    let no_wallet = h.post("/api/trading/place-order", Some(&session), order.clone()).await;
    assert_eq!(no_wallet.body["error"], "no_custodial_wallet");

    let missing = h
        .post("/api/trading/place-order", Some(&session), json!({"symbol": "SOL-PERP"}))
        .await;
    assert_eq!(missing.body["error"], "missing_required_fields");

    let (session, _) = h.login_with_wallet().await;
    h.hyperliquid.set_mid("SOL", 150.0);
    let placed = h.post("/api/trading/place-order", Some(&session), order).await;
    assert_eq!(placed.status, StatusCode::OK, "{}", placed.body);
    assert_eq!(placed.body["success"], true);
    assert!(placed.body["additionalOrders"].as_array().unwrap().is_empty());
    assert!(!h.hyperliquid.submitted().is_empty());

    let cancel = h.post("/api/trading/cancel-order", Some(&session), json!({"coin": "SOL"})).await;
    assert_eq!(cancel.body["error"], "missing_required_fields");
    let cancel = h
        .post("/api/trading/cancel-order", Some(&session), json!({"coin": "SOL", "oid": 1}))
        .await;
    assert_eq!(cancel.body["success"], true);
}

#[tokio::test]
async fn test_order_status_errors() {
    let h = harness();
    let (session, _) = h.login_with_wallet().await;
    h.hyperliquid.set_mid("SOL", 150.0);

    h.hyperliquid.reject("order", "Insufficient margin to place order. asset=5");
    let order = json!({"symbol": "SOL", "side": "long", "type": "market", "sizeUsd": 50});
    let reply = h.post("/api/trading/place-order", Some(&session), order).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{}", reply.body);
    assert_eq!(reply.body["error"], "insufficient_funds");

    let h = harness();
    let (session, _) = h.login_with_wallet().await;
    h.hyperliquid.reject_after(1, "Order has invalid price.");
    let order = json!({"symbol": "SOL", "side": "long", "type": "limit",
        "sizeCoin": 1, "price": 150, "slPrice": 140});
    let reply = h.post("/api/trading/place-order", Some(&session), order).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["success"], true);
    let legs = reply.body["additionalOrders"].as_array().unwrap();
    assert_eq!(legs.len(), 1);
    assert_eq!(legs[0]["type"], "stop_loss");
    assert_eq!(legs[0]["ok"], false);
    assert!(legs[0]["error"].as_str().unwrap().contains("invalid price"));
}

#[tokio::test]
async fn test_positions_degrade_and_rate_limit() {
    let config = ServerConfig {
        positions_limit: 2,
        ..ServerConfig::default()
    };
    let h = harness_with(config, Policy::default());
    let session = h.login().await;

    let reply = h.get("/api/trading/positions", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["error"], "no_custodial_wallet");

    let (session, _) = h.login_with_wallet().await;
    h.hyperliquid.fail_state_with(429);
    let reply = h.get("/api/trading/positions", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["positions"], json!([]));
    assert!(reply.body["marginSummary"].is_null());

    let _ = h.get("/api/trading/positions", Some(&session)).await;
    let limited = h.get("/api/trading/positions", Some(&session)).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.body["error"], "rate_limited");
}

#[tokio::test]
async fn test_drift_order_flow() {
    let h = harness();
    let (session, key) = h.login_with_wallet().await;
    let order = json!({"symbol": "SOL-PERP", "side": "short", "type": "market", "sizeUsd": 30});

    let unknown = h
        .post(
            "/api/trading/drift-place-order",
            Some(&session),
            json!({"symbol": "NOPE-PERP", "side": "long", "type": "market", "sizeUsd": 30}),
        )
        .await;
    assert_eq!(unknown.body["error"], "invalid_market_index");

    let poor = h.post("/api/trading/drift-place-order", Some(&session), order.clone()).await;
    assert_eq!(poor.status, StatusCode::BAD_REQUEST);
    assert_eq!(poor.body["error"], "insufficient_funds");

    h.rpc.set_balance(key, 100_000_000);
    h.hyperliquid.set_mid("SOL", 150.0);
    let not_initialized = h.post("/api/trading/drift-init-user", Some(&session), json!({})).await;
    assert_eq!(not_initialized.status, StatusCode::BAD_REQUEST);

    h.drift.add_user(key, 1);
    let init = h.post("/api/trading/drift-init-user", Some(&session), json!({})).await;
    assert_eq!(init.status, StatusCode::OK, "{}", init.body);
    assert_eq!(init.body["drift_subaccount"], 1);
    assert_eq!(init.body["userAccount"], init.body["drift_user_pda"]);

    let placed = h.post("/api/trading/drift-place-order", Some(&session), order).await;
    assert_eq!(placed.status, StatusCode::OK, "{}", placed.body);
    assert_eq!(placed.body["txSignature"], "drift-sig-1");
    assert_eq!(placed.body["orderParams"]["marketIndex"], 0);
    assert_eq!(placed.body["orderParams"]["side"], "short");
    assert_eq!(placed.body["orderParams"]["price"], 150.0);
    assert_eq!(h.drift.placed().len(), 1);
}

#[tokio::test]
async fn test_exchange_rate_and_swap() {
    let h = harness();
    let (session, _) = h.login_with_wallet().await;

    let rate = h.get("/api/exchange/rate?from=SOL&to=USDC", Some(&session)).await;
    assert_eq!(rate.status, StatusCode::OK);
    assert_eq!(rate.body["rate"], 150.0);
    assert_eq!(rate.body["usdcPrice"], 1.0);

    let bad = h.get("/api/exchange/rate?from=DOGE", Some(&session)).await;
    assert_eq!(bad.body["error"], "unsupported_token");

    let pair = h
        .post("/api/exchange/swap", Some(&session), json!({"fromToken": "SOL", "toToken": "SOL", "amount": 1}))
        .await;
    assert_eq!(pair.body["error"], "unsupported_token_pair");

    let amount = h
        .post("/api/exchange/swap", Some(&session), json!({"fromToken": "SOL", "toToken": "USDC", "amount": -1}))
        .await;
    assert_eq!(amount.body["error"], "invalid_amount");

    let swap = h
        .post("/api/exchange/swap", Some(&session), json!({"fromToken": "SOL", "toToken": "USDC", "amount": "0.5"}))
        .await;
    assert_eq!(swap.status, StatusCode::OK, "{}", swap.body);
    assert_eq!(swap.body["success"], true);
    assert_eq!(swap.body["outputAmount"], 75.0);
    assert_eq!(swap.body["inputToken"], "SOL");
    assert_eq!(h.rpc.sent().len(), 1);
}

#[tokio::test]
async fn test_orderbook_and_candles() {
    let h = harness();
    let book: L2Book = serde_json::from_value(json!({
        "coin": "BTC",
        "time": 1_700_000_000_000i64,
        "levels": [
            [{"px": "100004", "sz": "1.5", "n": 2}, {"px": "99991", "sz": "0.5", "n": 1}],
            [{"px": "100016", "sz": "2", "n": 1}]
        ]
    }))
    .unwrap();
    h.hyperliquid.set_book(book);

    let reply = h.get("/api/market/orderbook?coin=BTC&spread=10", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["spread"], 10.0);
    assert_eq!(reply.body["bids"].as_array().unwrap().len(), 12);
    assert_eq!(reply.body["bids"][0]["price"], 100_000.0);
    assert_eq!(reply.body["asks"][0]["price"], 100_020.0);

    let odd = h.get("/api/market/orderbook?coin=BTC&spread=7", None).await;
    assert_eq!(odd.body["spread"], 1.0);

    let bad = h.get("/api/market/candles?coin=BTC&tf=2m", None).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["error"], "invalid_timeframe");

    let candles = h.get("/api/market/candles?coin=BTC&tf=1h", None).await;
    assert_eq!(candles.status, StatusCode::OK);
    assert_eq!(candles.body["timeframe"], "1h");
    assert_eq!(candles.body["strategy"], "empty");
    assert_eq!(candles.body["candles"], json!([]));
}

#[tokio::test]
async fn test_account_baseline_and_secret() {
    let policy = Policy {
        reveal_passcode: Some("hunter22".to_string()),
        ..Policy::default()
    };
    let h = harness_with(ServerConfig::default(), policy);
    let session = h.login().await;

    let reveal = h.post("/api/account/secret", Some(&session), json!({"passcode": "hunter22"})).await;
    assert_eq!(reveal.status, StatusCode::NOT_FOUND);

    let (session, key) = h.login_with_wallet().await;
    let unset = h.get("/api/account/baseline", Some(&session)).await;
    assert!(unset.body["baselineUsd"].is_null());

    let invalid = h.post("/api/account/baseline", Some(&session), json!({"baselineUsd": "x"})).await;
    assert_eq!(invalid.body["error"], "invalid_baseline");
    let set = h.post("/api/account/baseline", Some(&session), json!({"baselineUsd": 1250.5})).await;
    assert_eq!(set.body["baselineUsd"], 1250.5);
    let got = h.get("/api/account/baseline", Some(&session)).await;
    assert_eq!(got.body["baselineUsd"], 1250.5);

    let get = h.get("/api/account/secret", Some(&session)).await;
    assert_eq!(get.status, StatusCode::FORBIDDEN);
    assert_eq!(get.body["error"], "passcode_required");

    let short = h.post("/api/account/secret", Some(&session), json!({"passcode": "abc"})).await;
    assert_eq!(short.body["error"], "invalid_passcode");
    let wrong = h.post("/api/account/secret", Some(&session), json!({"passcode": "wrong-one"})).await;
    assert_eq!(wrong.status, StatusCode::FORBIDDEN);

    let reveal = h.post("/api/account/secret", Some(&session), json!({"passcode": "hunter22"})).await;
    assert_eq!(reveal.status, StatusCode::OK);
    let secret = bs58::decode(reveal.body["secretKeyB58"].as_str().unwrap()).into_vec().unwrap();
    assert_eq!(secret.len(), 64);
    assert_eq!(&secret[32..], &key.to_bytes()[..]);
}

#[tokio::test]
async fn test_activity_errors_and_overview() {
    let h = harness();
    let session = h.login().await;
    let reply = h.get("/api/account/activity", Some(&session)).await;
    assert_eq!(reply.body, json!({"activity": []}));

    let (session, key) = h.login_with_wallet().await;
    h.activity.without_api_key();
    let reply = h.get("/api/account/activity", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["error"], "missing_helius_api_key");

    h.rpc.set_balance(key, 2_000_000_000);
    h.hyperliquid.set_mid("SOL", 150.0);
    let overview = h.get("/api/account/overview", Some(&session)).await;
    assert_eq!(overview.status, StatusCode::OK);
    assert_eq!(overview.body["sol"], 2.0);
    assert_eq!(overview.body["usdPrice"], 150.0);
    assert_eq!(overview.body["usd"], 300.0);
    assert_eq!(overview.body["history"], json!([]));
}
