//! # FraudGuard Core
//!
//! Core abstractions for the FraudGuard fraud-risk decision engine.
//!
//! This crate provides:
//! - Error taxonomy shared by all engine components
//! - Engine configuration (defaults, builder, TOML loading)
//! - Logging configuration and subscriber setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, EngineConfigBuilder, ScoringWeights};
    pub use crate::error::{EngineError, Result};
    pub use crate::observability::{LogConfig, LogLevel};
}
