//! Hyperliquid L1 action signing.
//!
//! Two stages, as the exchange verifies them:
//! 1. `action_hash` = keccak256(msgpack(action) || nonce_be || vault_tag)
//! 2. EIP-712 signature over the phantom `Agent { source, connectionId }`

use crate::error::{ClientError, ClientResult};
use alloy::primitives::{keccak256, Address, PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use alloy::sol;
use alloy::sol_types::eip712_domain;
use alloy::sol_types::SolStruct;
use perpsvc_core::TimeInForce;
use perpsvc_custody::CustodialKeypair;
use serde::Serialize;

/// L1 actions this backend submits.
///
/// Field order is part of the signature: msgpack encodes struct fields in
/// declaration order, with the `type` tag first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Order {
        orders: Vec<OrderWire>,
        grouping: String,
    },
    Cancel {
        cancels: Vec<CancelWire>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateLeverage {
        asset: u32,
        is_cross: bool,
        leverage: u32,
    },
}

impl Action {
    /// Single order, no TP/SL grouping.
    pub fn single_order(order: OrderWire) -> Self {
        Self::Order {
            orders: vec![order],
            grouping: "na".to_string(),
        }
    }

    pub fn cancel(asset: u32, oid: u64) -> Self {
        Self::Cancel {
            cancels: vec![CancelWire { asset, oid }],
        }
    }
}

/// Order wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderWire {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "b")]
    pub is_buy: bool,
    /// Limit price as string.
    #[serde(rename = "p")]
    pub limit_px: String,
    #[serde(rename = "s")]
    pub sz: String,
    #[serde(rename = "r")]
    pub reduce_only: bool,
    #[serde(rename = "t")]
    pub order_type: OrderTypeWire,
}

/// `{"limit": {"tif": "Gtc"|"Ioc"|"Alo"}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderTypeWire {
    pub limit: LimitOrderType,
}

impl OrderTypeWire {
    pub fn limit(tif: TimeInForce) -> Self {
        Self {
            limit: LimitOrderType {
                tif: tif.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitOrderType {
    pub tif: String,
}

/// `{"a": asset, "o": oid}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelWire {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "o")]
    pub oid: u64,
}

/// keccak256 over the msgpack action, the big-endian nonce and the vault tag.
///
/// No vault is encoded as a single 0x00 byte; a vault as 0x01 plus the
/// 20 address bytes.
pub fn action_hash(action: &Action, nonce: u64, vault: Option<Address>) -> ClientResult<B256> {
    let mut data = rmp_serde::to_vec_named(action)
        .map_err(|e| ClientError::Signing(format!("msgpack: {e}")))?;
    data.extend_from_slice(&nonce.to_be_bytes());
    match vault {
        None => data.push(0x00),
        Some(addr) => {
            data.push(0x01);
            data.extend_from_slice(addr.as_slice());
        }
    }
    Ok(keccak256(&data))
}

pub const EIP712_DOMAIN_NAME: &str = "Exchange";
pub const EIP712_DOMAIN_VERSION: &str = "1";
pub const EIP712_CHAIN_ID: u64 = 1337;
pub const EIP712_VERIFYING_CONTRACT: Address = Address::ZERO;

sol! {
    #[derive(Debug)]
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

/// Phantom agent: `source` is "a" on mainnet, "b" on testnet.
#[derive(Debug, Clone)]
pub struct PhantomAgent {
    pub source: String,
    pub connection_id: B256,
}

impl PhantomAgent {
    pub fn new(action_hash: B256, is_mainnet: bool) -> Self {
        Self {
            source: if is_mainnet { "a" } else { "b" }.to_string(),
            connection_id: action_hash,
        }
    }

    pub async fn sign<S: AlloySigner + Send + Sync>(
        &self,
        signer: &S,
    ) -> Result<PrimitiveSignature, alloy::signers::Error> {
        let domain = eip712_domain! {
            name: EIP712_DOMAIN_NAME,
            version: EIP712_DOMAIN_VERSION,
            chain_id: EIP712_CHAIN_ID,
            verifying_contract: EIP712_VERIFYING_CONTRACT,
        };
        let agent = Agent {
            source: self.source.clone(),
            connectionId: self.connection_id,
        };
        signer.sign_hash(&agent.eip712_signing_hash(&domain)).await
    }
}

/// Signature components as the exchange endpoint expects them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSignature {
    /// 0x-prefixed hex.
    pub r: String,
    /// 0x-prefixed hex.
    pub s: String,
    /// 27 or 28.
    pub v: u8,
}

impl From<PrimitiveSignature> for ActionSignature {
    fn from(sig: PrimitiveSignature) -> Self {
        Self {
            r: format!("0x{}", hex::encode(sig.r().to_be_bytes::<32>())),
            s: format!("0x{}", hex::encode(sig.s().to_be_bytes::<32>())),
            v: 27 + sig.v() as u8,
        }
    }
}

/// Body posted to `/exchange`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub action: Action,
    pub nonce: u64,
    pub signature: ActionSignature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_address: Option<String>,
}

/// Per-user L1 signer. Never logs key material.
pub struct HyperliquidSigner {
    signer: PrivateKeySigner,
    is_mainnet: bool,
}

impl HyperliquidSigner {
    pub fn new(signer: PrivateKeySigner, is_mainnet: bool) -> Self {
        Self { signer, is_mainnet }
    }

    /// Signer for a custodial account: its Ed25519 seed is the secp256k1 key.
    pub fn from_keypair(keypair: &CustodialKeypair, is_mainnet: bool) -> ClientResult<Self> {
        Ok(Self::new(keypair.evm_signer()?, is_mainnet))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Lowercase 0x-prefixed address, the form the info endpoint keys users by.
    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.address().as_slice()))
    }

    pub async fn sign(&self, action: Action, nonce: u64) -> ClientResult<ExchangeRequest> {
        let hash = action_hash(&action, nonce, None)?;
        let signature = PhantomAgent::new(hash, self.is_mainnet)
            .sign(&self.signer)
            .await
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        Ok(ExchangeRequest {
            action,
            nonce,
            signature: signature.into(),
            vault_address: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_signer() -> PrivateKeySigner {
        let bytes = hex::decode(TEST_PRIVATE_KEY.trim_start_matches("0x")).unwrap();
        PrivateKeySigner::from_slice(&bytes).unwrap()
    }

    fn order() -> OrderWire {
        OrderWire {
            asset: 0,
            is_buy: true,
            limit_px: "100".to_string(),
            sz: "1".to_string(),
            reduce_only: false,
            order_type: OrderTypeWire::limit(TimeInForce::Ioc),
        }
    }

    #[test]
    fn test_order_action_json_shape() {
        let json = serde_json::to_string(&Action::single_order(order())).unwrap();
        assert_eq!(
            json,
            r#"{"type":"order","orders":[{"a":0,"b":true,"p":"100","s":"1","r":false,"t":{"limit":{"tif":"Ioc"}}}],"grouping":"na"}"#
        );
    }

    #[test]
    fn test_update_leverage_json_shape() {
        let action = Action::UpdateLeverage {
            asset: 5,
            is_cross: true,
            leverage: 10,
        };
        assert_eq!(
            serde_json::to_string(&action).unwrap(),
            r#"{"type":"updateLeverage","asset":5,"isCross":true,"leverage":10}"#
        );
        assert_eq!(
            serde_json::to_string(&Action::cancel(3, 77)).unwrap(),
            r#"{"type":"cancel","cancels":[{"a":3,"o":77}]}"#
        );
    }

    #[test]
    fn test_msgpack_starts_with_type_key() {
        let bytes = rmp_serde::to_vec_named(&Action::single_order(order())).unwrap();
        // fixmap(3), fixstr(4) "type"
        assert_eq!(bytes[0], 0x83);
        assert_eq!(&bytes[1..6], b"\xa4type");
    }

    #[test]
    fn test_action_hash_depends_on_nonce_and_vault() {
        let action = Action::single_order(order());
        let a = action_hash(&action, 1, None).unwrap();
        let b = action_hash(&action, 2, None).unwrap();
        let c = action_hash(&action, 1, Some(Address::ZERO)).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, action_hash(&action, 1, None).unwrap());
    }

    /// Known-answer vector from the reference Python SDK.
    #[tokio::test]
    async fn test_phantom_agent_signature_vector() {
        let hash = B256::from_slice(
            &hex::decode("f01fa6eaca0b8cbd2afe65f8852a2e00d35eae3d19560ece9b8a28614646e849")
                .unwrap(),
        );
        let sig = PhantomAgent::new(hash, false)
            .sign(&test_signer())
            .await
            .unwrap();
        let wire = ActionSignature::from(sig);
        assert_eq!(
            wire.r,
            "0xa9e728f2faea4febc0b6eb9c3dbbac04b375eb3869f051030d205318425faebc"
        );
        assert_eq!(
            wire.s,
            "0x7b21be7030bb979352b71494708b99d789266f0d0e1242a21e74905b683e4698"
        );
        assert_eq!(wire.v, 27);
    }

    #[tokio::test]
    async fn test_custodial_signer_is_deterministic() {
        let kp = CustodialKeypair::from_seed(&[9u8; 32]);
        let a = HyperliquidSigner::from_keypair(&kp, true).unwrap();
        let b = HyperliquidSigner::from_keypair(&kp, true).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address_hex().starts_with("0x"));
        assert_eq!(a.address_hex().len(), 42);

        let req = a.sign(Action::cancel(0, 1), 1_700_000_000_000).await.unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["nonce"], 1_700_000_000_000u64);
        assert!(json.get("vaultAddress").is_none());
        assert!(req.signature.v == 27 || req.signature.v == 28);
    }
}
