//! Deposit/withdraw history from on-chain balance deltas.

use crate::rpc::{SignatureInfo, TransactionMeta};
use perpsvc_core::LAMPORTS_PER_SOL;
use serde::Serialize;

/// Signatures scanned per overview request.
pub const HISTORY_SCAN_LIMIT: usize = 30;
/// Entries returned.
pub const HISTORY_MAX_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub signature: String,
    pub kind: HistoryKind,
    pub lamports: u64,
    pub sol: f64,
    /// Milliseconds since epoch.
    pub ts: i64,
}

/// Net lamport change for `account` in one transaction.
pub fn balance_delta(meta: &TransactionMeta, account: &str) -> Option<i128> {
    let idx = meta.account_keys.iter().position(|k| k == account)?;
    let pre = meta.pre_balances.get(idx).copied().unwrap_or(0) as i128;
    let post = meta.post_balances.get(idx).copied().unwrap_or(0) as i128;
    Some(post - pre)
}

/// Newest-first history, zero deltas skipped, at most 20 entries.
pub fn build_history(
    account: &str,
    txs: impl IntoIterator<Item = (SignatureInfo, Option<TransactionMeta>)>,
    now_secs: i64,
) -> Vec<HistoryEntry> {
    let mut history: Vec<HistoryEntry> = txs
        .into_iter()
        .filter_map(|(info, meta)| {
            let meta = meta?;
            let delta = balance_delta(&meta, account)?;
            if delta == 0 {
                return None;
            }
            let lamports = delta.unsigned_abs() as u64;
            let ts_secs = meta.block_time.or(info.block_time).unwrap_or(now_secs);
            Some(HistoryEntry {
                signature: info.signature,
                kind: if delta > 0 {
                    HistoryKind::Deposit
                } else {
                    HistoryKind::Withdraw
                },
                lamports,
                sol: lamports as f64 / LAMPORTS_PER_SOL as f64,
                ts: ts_secs * 1000,
            })
        })
        .collect();

    history.sort_by(|a, b| b.ts.cmp(&a.ts));
    history.truncate(HISTORY_MAX_ENTRIES);
    history
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(sig: &str, t: i64, pre: u64, post: u64) -> (SignatureInfo, Option<TransactionMeta>) {
        (
            SignatureInfo {
                signature: sig.to_string(),
                block_time: Some(t),
            },
            Some(TransactionMeta {
                block_time: Some(t),
                account_keys: vec!["other".to_string(), "me".to_string()],
                pre_balances: vec![0, pre],
                post_balances: vec![0, post],
            }),
        )
    }

    #[test]
    fn test_kinds_and_order() {
        let history = build_history(
            "me",
            vec![
                tx("a", 100, 0, 10_000_000),
                tx("b", 300, 10_000_000, 4_995_000),
                tx("c", 200, 5, 5),
            ],
            0,
        );
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].signature, "b");
        assert_eq!(history[0].kind, HistoryKind::Withdraw);
        assert_eq!(history[0].lamports, 5_005_000);
        assert_eq!(history[0].ts, 300_000);
        assert_eq!(history[1].kind, HistoryKind::Deposit);
        assert!((history[1].sol - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_skips_foreign_and_missing() {
        let (info, _) = tx("x", 1, 0, 1);
        let history = build_history(
            "nobody",
            vec![tx("a", 1, 0, 1), (info, None)],
            0,
        );
        assert!(history.is_empty());
    }

    #[test]
    fn test_caps_entries() {
        let txs = (0..30).map(|i| tx(&format!("s{i}"), i, 0, 1 + i as u64));
        let history = build_history("me", txs, 0);
        assert_eq!(history.len(), HISTORY_MAX_ENTRIES);
        assert_eq!(history[0].signature, "s29");
    }

    #[test]
    fn test_serializes_lowercase_kind() {
        let history = build_history("me", vec![tx("a", 1, 0, 1)], 0);
        let json = serde_json::to_value(&history[0]).unwrap();
        assert_eq!(json["kind"], "deposit");
    }
}
