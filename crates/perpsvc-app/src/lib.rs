//! perpsvc backend application.
//!
//! Loads configuration, builds the service graph and runs the upstream
//! market feed, the market hub and the HTTP server together.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
