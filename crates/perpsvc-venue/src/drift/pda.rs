//! Drift account addresses.

use solana_pubkey::Pubkey;

/// Drift v2 program on mainnet.
pub const DRIFT_PROGRAM_ID: Pubkey = Pubkey::from_str_const("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");

/// Drift `User` account for an authority and sub-account id.
pub fn user_account_pda(authority: &Pubkey, sub_account: u16) -> Pubkey {
    let sub = sub_account.to_le_bytes();
    Pubkey::find_program_address(&[b"user", authority.as_ref(), &sub], &DRIFT_PROGRAM_ID).0
}

/// Drift `UserStats` account for an authority.
pub fn user_stats_pda(authority: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"user_stats", authority.as_ref()], &DRIFT_PROGRAM_ID).0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> Pubkey {
        Pubkey::new_from_array([1u8; 32])
    }

    #[test]
    fn test_program_id() {
        assert_eq!(
            DRIFT_PROGRAM_ID.to_string(),
            "dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH"
        );
    }

    #[test]
    fn test_user_account_addresses() {
        assert_eq!(
            authority().to_string(),
            "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi"
        );
        assert_eq!(
            user_account_pda(&authority(), 0).to_string(),
            "AFikJAMaqWeJPwYXtP7wwVRKCNS8cQdzdprTEdVk7miG"
        );
        assert_eq!(
            user_account_pda(&authority(), 1).to_string(),
            "qoEiLQK1wgYCuomdDgYGx7H8F8qPyPNDCX75t3LLhwf"
        );
    }

    #[test]
    fn test_user_stats_address() {
        let (key, bump) =
            Pubkey::find_program_address(&[b"user_stats", authority().as_ref()], &DRIFT_PROGRAM_ID);
        assert_eq!(key.to_string(), "2HwY79wFyTNRM4U28YCUw4etZFswL8VCa7HFvPKUSYug");
        assert_eq!(bump, 255);
        assert_eq!(user_stats_pda(&authority()), key);
    }

    #[test]
    fn test_pda_is_off_curve() {
        assert!(!user_account_pda(&authority(), 0).is_on_curve());
    }
}
