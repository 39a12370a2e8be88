//! Login nonce generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Nonce length in characters.
pub const NONCE_LEN: usize = 48;

/// 48 characters drawn uniformly from `[A-Za-z0-9]`.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
