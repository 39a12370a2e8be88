//! Wallet operations composed from the RPC seam.

use crate::error::{LedgerError, LedgerResult};
use crate::fee::{FeeConvergence, MaxWithdraw, DEFAULT_FEE_LAMPORTS, WITHDRAW_FEE_BUFFER};
use crate::history::{build_history, HistoryEntry, HISTORY_SCAN_LIMIT};
use crate::pubkey::{parse_pubkey, Pubkey};
use crate::rpc::DynSolanaRpc;
use crate::tx;
use perpsvc_core::{Token, LAMPORTS_PER_SOL};
use perpsvc_custody::CustodialKeypair;
use perpsvc_telemetry::Metrics;
use serde::Serialize;
use solana_sdk::signature::Signer;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::{info, warn};

/// Status polls before giving up on confirmation.
const CONFIRM_ATTEMPTS: u32 = 30;
const CONFIRM_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub lamports: u64,
    pub sol: f64,
    pub usdc: f64,
}

#[derive(Clone)]
pub struct WalletLedger {
    rpc: DynSolanaRpc,
    confirm_attempts: u32,
    confirm_interval: Duration,
}

impl WalletLedger {
    pub fn new(rpc: DynSolanaRpc) -> Self {
        Self {
            rpc,
            confirm_attempts: CONFIRM_ATTEMPTS,
            confirm_interval: CONFIRM_INTERVAL,
        }
    }

    /// Override the confirmation polling schedule.
    pub fn with_confirmation(mut self, attempts: u32, interval: Duration) -> Self {
        self.confirm_attempts = attempts.max(1);
        self.confirm_interval = interval;
        self
    }

    pub fn rpc(&self) -> &DynSolanaRpc {
        &self.rpc
    }

    /// SOL and USDC balances. A missing token account reads as zero.
    pub async fn balance(&self, owner: Pubkey) -> LedgerResult<Balance> {
        let lamports = self.rpc.get_balance(owner).await?;
        let usdc_mint = parse_pubkey(Token::Usdc.mint())?;
        let usdc_units = match self.rpc.get_token_balance(owner, usdc_mint).await {
            Ok(units) => units,
            Err(e) => {
                warn!(owner = %owner, error = %e, "USDC balance lookup failed, reporting 0");
                0
            }
        };

        Ok(Balance {
            lamports,
            sol: lamports as f64 / LAMPORTS_PER_SOL as f64,
            usdc: Token::Usdc.from_base_units(usdc_units),
        })
    }

    /// Network fee for a real transfer message against the latest blockhash.
    pub async fn estimate_fee(&self, from: Pubkey, to: Pubkey, lamports: u64) -> LedgerResult<u64> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let message = tx::transfer_message(&from, &to, lamports.max(1), &blockhash);
        Ok(self
            .rpc
            .get_fee_for_message(message)
            .await?
            .unwrap_or(DEFAULT_FEE_LAMPORTS))
    }

    /// Largest withdrawable amount under the fee safety margin.
    pub async fn max_withdraw(&self, from: Pubkey, to: Pubkey) -> LedgerResult<MaxWithdraw> {
        let balance = self.rpc.get_balance(from).await?;
        let mut conv = FeeConvergence::new(balance);
        while !conv.is_done() {
            let fee = self.estimate_fee(from, to, conv.amount()).await?;
            conv.step(fee);
        }
        Ok(conv.result())
    }

    /// Transfer SOL out of the custodial account and wait for confirmation.
    pub async fn withdraw(&self, keypair: &CustodialKeypair, to: Pubkey, lamports: u64) -> LedgerResult<String> {
        let signer = keypair.solana_keypair();
        let from = signer.pubkey();
        let balance = self.rpc.get_balance(from).await?;
        if lamports.saturating_add(WITHDRAW_FEE_BUFFER) > balance {
            Metrics::withdrawal("rejected");
            return Err(LedgerError::InsufficientFunds { balance });
        }

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let signed = tx::signed_transfer(&signer, &to, lamports, blockhash);

        let result = self.submit_and_confirm(signed.into()).await;
        match &result {
            Ok(signature) => {
                Metrics::withdrawal("submitted");
                info!(from = %from, to = %to, lamports, %signature, "Withdrawal confirmed");
            }
            Err(e) => {
                Metrics::withdrawal("failed");
                warn!(from = %from, to = %to, lamports, error = %e, "Withdrawal failed");
            }
        }
        result
    }

    /// Send a signed transaction and poll until confirmed.
    pub async fn submit_and_confirm(&self, signed: VersionedTransaction) -> LedgerResult<String> {
        let signature = self.rpc.send_transaction(signed).await?;
        self.confirm(&signature).await?;
        Ok(signature)
    }

    pub async fn confirm(&self, signature: &str) -> LedgerResult<()> {
        for attempt in 0..self.confirm_attempts {
            if let Some(status) = self.rpc.get_signature_status(signature).await? {
                if let Some(reason) = status.err {
                    return Err(LedgerError::TransactionFailed {
                        signature: signature.to_string(),
                        reason,
                    });
                }
                if status.confirmed {
                    return Ok(());
                }
            }
            if attempt + 1 < self.confirm_attempts {
                tokio::time::sleep(self.confirm_interval).await;
            }
        }
        Err(LedgerError::NotConfirmed(signature.to_string()))
    }

    /// Recent deposits and withdrawals. RPC failures yield an empty list.
    pub async fn history(&self, owner: Pubkey, now_secs: i64) -> Vec<HistoryEntry> {
        let sigs = match self
            .rpc
            .get_signatures_for_address(owner, HISTORY_SCAN_LIMIT)
            .await
        {
            Ok(sigs) => sigs,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Signature scan failed");
                return Vec::new();
            }
        };

        let mut txs = Vec::with_capacity(sigs.len());
        for info in sigs {
            let meta = self.rpc.get_transaction(&info.signature).await.ok().flatten();
            txs.push((info, meta));
        }
        build_history(&owner.to_string(), txs, now_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{FakeRpc, TransactionMeta};
    use crate::HistoryKind;
    use std::sync::Arc;

    fn setup(balance: u64) -> (Arc<FakeRpc>, WalletLedger, CustodialKeypair) {
        let kp = CustodialKeypair::from_seed(&[8u8; 32]);
        let rpc = Arc::new(FakeRpc::new());
        rpc.set_balance(Pubkey::from(kp.public_key_bytes()), balance);
        let ledger = WalletLedger::new(rpc.clone()).with_confirmation(2, Duration::from_millis(1));
        (rpc, ledger, kp)
    }

    #[tokio::test]
    async fn test_withdraw_submits_signed_transfer() {
        let (rpc, ledger, kp) = setup(10_000_000);
        let to = Pubkey::new_from_array([4u8; 32]);

        let signature = ledger.withdraw(&kp, to, 9_999_990 - 5_000).await.unwrap();
        let sent = rpc.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signatures[0].to_string(), signature);
        assert_eq!(sent[0].message.static_account_keys()[0], kp.solana_keypair().pubkey());
        assert_eq!(sent[0].message.static_account_keys()[1], to);
        assert!(sent[0].verify_with_results().iter().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_withdraw_over_buffer_rejected_without_submit() {
        let (rpc, ledger, kp) = setup(10_000_000);
        let err = ledger
            .withdraw(&kp, Pubkey::new_from_array([4u8; 32]), 9_999_999)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { balance: 10_000_000 }));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn test_balance_reads_usdc() {
        let (rpc, ledger, kp) = setup(1_500_000_000);
        let owner = Pubkey::from(kp.public_key_bytes());
        rpc.set_token_balance(owner, parse_pubkey(Token::Usdc.mint()).unwrap(), 12_340_000);

        let balance = ledger.balance(owner).await.unwrap();
        assert_eq!(balance.lamports, 1_500_000_000);
        assert_eq!(balance.sol, 1.5);
        assert_eq!(balance.usdc, 12.34);
    }

    #[tokio::test]
    async fn test_fee_defaults_when_null() {
        let (rpc, ledger, kp) = setup(0);
        rpc.set_fee(None);
        let from = Pubkey::from(kp.public_key_bytes());
        assert_eq!(ledger.estimate_fee(from, from, 1000).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_max_withdraw() {
        let (_, ledger, kp) = setup(2_000_000_000);
        let from = Pubkey::from(kp.public_key_bytes());
        let res = ledger.max_withdraw(from, Pubkey::new_from_array([4u8; 32])).await.unwrap();
        assert_eq!(res.max_lamports, 2_000_000_000 - 500_000 - 600_000);
        assert_eq!(res.iterations, 1);
    }

    #[tokio::test]
    async fn test_history_from_rpc() {
        let (rpc, ledger, kp) = setup(0);
        let owner = Pubkey::from(kp.public_key_bytes());
        rpc.add_transaction(
            owner,
            "sig-1",
            TransactionMeta {
                block_time: Some(1_700_000_000),
                account_keys: vec![owner.to_string()],
                pre_balances: vec![0],
                post_balances: vec![10_000_000],
            },
        );

        let history = ledger.history(owner, 0).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, HistoryKind::Deposit);
        assert_eq!(history[0].ts, 1_700_000_000_000);
    }
}
