//! Perp asset specification and wire formatting rules.
//!
//! Hyperliquid perps accept prices with at most 5 significant figures and
//! at most `6 - szDecimals` decimal places; sizes are truncated to
//! `szDecimals` decimal places.

use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum significant figures for a perp price.
pub const MAX_SIG_FIGS: u32 = 5;

/// Maximum decimals for a perp price before subtracting `sz_decimals`.
pub const PERP_MAX_DECIMALS: u32 = 6;

/// Asset entry from the venue's perp universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Position in the universe array (the asset id used on the wire).
    pub index: u32,
    /// Coin name (e.g., "BTC").
    pub name: String,
    /// Size decimals (szDecimals).
    pub sz_decimals: u32,
    /// Maximum leverage the venue allows.
    pub max_leverage: u32,
}

impl AssetSpec {
    /// Fallback spec used when the universe lookup misses.
    pub fn fallback(name: impl Into<String>) -> Self {
        Self {
            index: 0,
            name: name.into(),
            sz_decimals: 3,
            max_leverage: 20,
        }
    }

    /// Maximum price decimals for this asset.
    pub fn max_price_decimals(&self) -> u32 {
        PERP_MAX_DECIMALS.saturating_sub(self.sz_decimals)
    }

    /// Format a price for the wire (truncating, trailing zeros stripped).
    pub fn format_price(&self, price: Price) -> String {
        format_decimal_with_constraints(price.inner(), MAX_SIG_FIGS, self.max_price_decimals())
    }

    /// Format a size for the wire. Sizes are never rounded up.
    pub fn format_size(&self, size: Size) -> String {
        format_decimal(size.floor_to_decimals(self.sz_decimals).inner())
    }
}

/// Format a Decimal with max significant figures and max decimal places.
///
/// Truncates (floors) to the constraints and strips trailing zeros.
fn format_decimal_with_constraints(value: Decimal, max_sig_figs: u32, max_decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let sign = if value.is_sign_negative() { "-" } else { "" };
    let truncated_sig = truncate_to_sig_figs(value.abs(), max_sig_figs);
    let truncated = truncate_to_decimals(truncated_sig, max_decimals);

    format!("{sign}{}", format_decimal(truncated))
}

/// Truncate a Decimal to N significant figures (floor, not round).
fn truncate_to_sig_figs(value: Decimal, max_sig_figs: u32) -> Decimal {
    if value.is_zero() || max_sig_figs == 0 {
        return Decimal::ZERO;
    }

    // 12345 -> 4, 0.00123 -> -3
    let magnitude = magnitude(value);
    let scale = max_sig_figs as i32 - magnitude - 1;

    if scale >= 0 {
        truncate_to_decimals(value, scale as u32)
    } else {
        let factor = Decimal::from(10i64.pow((-scale) as u32));
        (value / factor).trunc() * factor
    }
}

fn truncate_to_decimals(value: Decimal, max_decimals: u32) -> Decimal {
    let factor = Decimal::from(10i64.pow(max_decimals));
    (value * factor).trunc() / factor
}

fn magnitude(value: Decimal) -> i32 {
    let int_part = value.trunc();
    if !int_part.is_zero() {
        return int_part.to_string().len() as i32 - 1;
    }

    let mut magnitude = 0;
    let s = value.to_string();
    for c in s.chars().skip_while(|c| *c != '.').skip(1) {
        magnitude -= 1;
        if c != '0' {
            break;
        }
    }
    magnitude
}

fn format_decimal(value: Decimal) -> String {
    let s = value.normalize().to_string();
    if s == "-0" {
        "0".to_string()
    } else {
        s
    }
}
