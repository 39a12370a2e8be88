//! Account addresses.

use crate::error::{LedgerError, LedgerResult};
use std::str::FromStr;

pub use solana_sdk::pubkey::Pubkey;

/// Parse a base58 address, trimming surrounding whitespace.
pub fn parse_pubkey(address: &str) -> LedgerResult<Pubkey> {
    let trimmed = address.trim();
    Pubkey::from_str(trimmed).map_err(|e| LedgerError::InvalidAddress(format!("{trimmed}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pubkey() {
        let key = parse_pubkey(" 11111111111111111111111111111111 ").unwrap();
        assert_eq!(key, Pubkey::default());

        let key = Pubkey::new_from_array([5u8; 32]);
        assert_eq!(parse_pubkey(&key.to_string()).unwrap(), key);
    }

    #[test]
    fn test_parse_pubkey_rejects_garbage() {
        for bad in ["", "not-base58!", "1111"] {
            let err = parse_pubkey(bad).unwrap_err();
            assert_eq!(err.code(), "invalid_destination");
        }
    }
}
