/// Mailgate Core - Shared library for the Mailgate email gateway
///
/// This crate contains the data model, error taxonomy, service traits and
/// their production/in-memory implementations, provider drivers, and
/// utilities shared by the Mailgate API and worker binaries.
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use error::{ErrorCategory, GatewayError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
