//! Core domain types for the perpsvc trading backend.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `AssetSpec`: Perp asset precision rules (price/size formatting)
//! - `OrderRequest` / `ValidatedOrder`: Trade request shape and validation
//! - `Token`: Supported SPL tokens and their mints
//! - `VenueErrorKind`: Typed error vocabulary for venue adapters

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod token;
pub mod venue;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{AssetSpec, MAX_SIG_FIGS, PERP_MAX_DECIMALS};
pub use order::{
    OrderKind, OrderRequest, OrderSide, OrderValidationError, TimeInForce, ValidatedOrder,
};
pub use token::{Token, LAMPORTS_PER_SOL};
pub use venue::{VenueError, VenueErrorKind};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
