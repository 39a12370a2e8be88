//! Typed venue error vocabulary.
//!
//! Adapters classify upstream failures once, at the edge; handlers only
//! ever see a `VenueErrorKind`.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueErrorKind {
    /// Price moved past the allowed slippage.
    Slippage,
    /// Oracle price unavailable or stale.
    Oracle,
    /// Account margin or balance too low.
    InsufficientFunds,
    /// Venue or RPC unreachable.
    Connection,
    /// Custodial key could not be loaded or decoded.
    Wallet,
    /// Upstream throttled us.
    RateLimited,
    /// The venue has no account for this user.
    UnknownUser,
    /// Order rejected for any other reason.
    Rejected,
    /// Malformed or unexpected upstream response.
    Transport,
}

impl VenueErrorKind {
    /// Client-facing error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Slippage => "slippage_error",
            Self::Oracle => "oracle_error",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Connection => "connection_failed",
            Self::Wallet => "wallet_error",
            Self::RateLimited => "rate_limited",
            Self::UnknownUser => "user_not_initialized",
            Self::Rejected => "order_placement_failed",
            Self::Transport => "upstream_error",
        }
    }

    /// HTTP status for this kind.
    pub fn status(&self) -> u16 {
        match self {
            Self::Slippage | Self::InsufficientFunds | Self::Wallet | Self::UnknownUser => 400,
            Self::RateLimited => 429,
            Self::Connection => 503,
            Self::Transport => 502,
            Self::Oracle | Self::Rejected => 500,
        }
    }

    /// Map an upstream error message onto a kind.
    ///
    /// Only adapters call this; the match is on lowercase substrings.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_ascii_lowercase();
        if msg.contains("slippage") {
            Self::Slippage
        } else if msg.contains("oracle") {
            Self::Oracle
        } else if msg.contains("insufficient") {
            Self::InsufficientFunds
        } else if msg.contains("429") || msg.contains("rate limit") || msg.contains("too many") {
            Self::RateLimited
        } else if msg.contains("does not exist")
            || msg.contains("user not found")
            || msg.contains("not initialized")
        {
            Self::UnknownUser
        } else if msg.contains("connection")
            || msg.contains("timed out")
            || msg.contains("timeout")
            || msg.contains("econnrefused")
        {
            Self::Connection
        } else {
            Self::Rejected
        }
    }
}

impl fmt::Display for VenueErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Venue failure with the upstream detail kept for debugging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct VenueError {
    pub kind: VenueErrorKind,
    pub message: String,
}

impl VenueError {
    pub fn new(kind: VenueErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a raw upstream message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: VenueErrorKind::classify(&message),
            message,
        }
    }
}
