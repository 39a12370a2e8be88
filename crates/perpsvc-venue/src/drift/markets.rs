//! Drift perp market indices.

/// Perp markets by base symbol, as listed on Drift mainnet.
pub const PERP_MARKETS: &[(&str, u16)] = &[
    ("SOL", 0),
    ("BTC", 1),
    ("ETH", 2),
    ("APT", 3),
    ("BNB", 4),
    ("MATIC", 5),
    ("ARB", 6),
    ("DOGE", 7),
    ("AVAX", 8),
    ("OP", 9),
    ("SUI", 10),
    ("WIF", 11),
    ("JTO", 12),
    ("PYTH", 13),
    ("TIA", 14),
    ("JUP", 15),
    ("TNSR", 16),
    ("W", 17),
    ("ENA", 18),
    ("DRIFT", 19),
    ("RAY", 20),
];

/// Market index for "SOL", "sol-PERP", etc.
pub fn market_index(symbol: &str) -> Option<u16> {
    let base = symbol.trim().to_ascii_uppercase();
    let base = base.strip_suffix("-PERP").unwrap_or(&base);
    PERP_MARKETS
        .iter()
        .find(|(name, _)| *name == base)
        .map(|(_, idx)| *idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(market_index("SOL"), Some(0));
        assert_eq!(market_index("btc-perp"), Some(1));
        assert_eq!(market_index("RAY-PERP"), Some(20));
        assert_eq!(market_index("PEPE"), None);
    }
}
