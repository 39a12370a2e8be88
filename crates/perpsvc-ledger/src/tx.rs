//! Transaction building and signing.
//!
//! Only what the wallet endpoints need: a single system-program transfer,
//! and re-signing a serialized transaction (legacy or v0) produced by an
//! aggregator.

use crate::error::{LedgerError, LedgerResult};
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use solana_system_interface::instruction as system_instruction;

/// Unsigned transfer message, used for fee quotes.
pub fn transfer_message(from: &Pubkey, to: &Pubkey, lamports: u64, blockhash: &Hash) -> Message {
    let ix = system_instruction::transfer(from, to, lamports);
    Message::new_with_blockhash(&[ix], Some(from), blockhash)
}

/// Transfer from `keypair`, which also pays the fee.
pub fn signed_transfer(keypair: &Keypair, to: &Pubkey, lamports: u64, blockhash: Hash) -> Transaction {
    let from = keypair.pubkey();
    let ix = system_instruction::transfer(&from, to, lamports);
    Transaction::new_signed_with_payer(&[ix], Some(&from), &[keypair], blockhash)
}

/// Decode a bincode transaction and sign it as its only required signer.
pub fn sign_serialized(raw: &[u8], keypair: &Keypair) -> LedgerResult<VersionedTransaction> {
    let unsigned: VersionedTransaction = bincode::deserialize(raw)
        .map_err(|e| LedgerError::Decode(format!("transaction: {e}")))?;
    VersionedTransaction::try_new(unsigned.message, &[keypair])
        .map_err(|e| LedgerError::Signing(e.to_string()))
}
