//! Supported SPL tokens.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Tokens the exchange and balance endpoints understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Sol,
    Usdc,
}

impl Token {
    pub const SOL_MINT: &'static str = "So11111111111111111111111111111111111111112";
    pub const USDC_MINT: &'static str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    pub fn mint(&self) -> &'static str {
        match self {
            Self::Sol => Self::SOL_MINT,
            Self::Usdc => Self::USDC_MINT,
        }
    }

    pub fn decimals(&self) -> u32 {
        match self {
            Self::Sol => 9,
            Self::Usdc => 6,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Sol => "SOL",
            Self::Usdc => "USDC",
        }
    }

    /// Smallest units in one whole token.
    pub fn unit(&self) -> u64 {
        10u64.pow(self.decimals())
    }

    /// Whole-token amount to base units, floored.
    pub fn to_base_units(&self, amount: f64) -> u64 {
        (amount * self.unit() as f64).floor().max(0.0) as u64
    }

    pub fn from_base_units(&self, units: u64) -> f64 {
        units as f64 / self.unit() as f64
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Token {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SOL" => Ok(Self::Sol),
            "USDC" => Ok(Self::Usdc),
            _ => Err(CoreError::UnsupportedToken(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("sol".parse::<Token>().unwrap(), Token::Sol);
        assert_eq!("USDC".parse::<Token>().unwrap(), Token::Usdc);
        assert!("BONK".parse::<Token>().is_err());
    }

    #[test]
    fn test_base_units() {
        assert_eq!(Token::Sol.to_base_units(0.5), 500_000_000);
        assert_eq!(Token::Usdc.to_base_units(1.25), 1_250_000);
        assert_eq!(Token::Usdc.from_base_units(2_500_000), 2.5);
        assert_eq!(Token::Sol.unit(), LAMPORTS_PER_SOL);
    }
}
