//! Wallet-signature login and server-validated sessions.
//!
//! Login is a single round trip: the browser fetches a nonce (stored in a
//! cookie), signs a message containing it with its Solana wallet, and posts
//! `{address, signature, message}`. A verified login yields a session token
//! whose claims are HMAC-signed; the token alone is not enough, the session
//! row it names must also be live in the store.

pub mod challenge;
pub mod cookie;
pub mod error;
pub mod nonce;
pub mod session;

pub use challenge::LoginChallenge;
pub use cookie::{clear_cookie, read_cookie, set_cookie, CookieOptions};
pub use error::{AuthError, AuthResult};
pub use nonce::{generate_nonce, NONCE_LEN};
pub use session::{SessionClaims, SessionSigner};

/// Cookie holding the session token.
pub const SESSION_COOKIE: &str = "app_session";
/// Cookie holding the pending login nonce.
pub const NONCE_COOKIE: &str = "login_nonce";
/// Session lifetime: 30 days.
pub const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;
/// Nonce lifetime: 10 minutes.
pub const NONCE_MAX_AGE_SECS: i64 = 600;
