//! FAQ Common - Shared types, utilities, and configuration for the FAQ bot.
//!
//! This crate provides:
//! - Configuration types and loading (JSON file + environment overrides)
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Config, FaqConfig, LineConfig, LlmConfig, NetworkConfig, ObservabilityConfig, SessionConfig,
};
pub use error::{Error, Result};
