//! Callgate Core Library
//!
//! This crate provides the foundational types and error handling shared by
//! every layer of the gateway. It includes:
//!
//! - Domain models (subscriber `Identity`, client `ClientIntent`)
//! - Unified error handling with HTTP response mapping
//! - Gateway configuration

pub mod config;
pub mod error;
pub mod models;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use models::{Action, ClientIntent, Identity};

/// Result type alias using GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;
