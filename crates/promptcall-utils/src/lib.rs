//! Shared utilities for promptcall
//!
//! This crate provides common functionality used across the promptcall workspace:
//! tracing setup and the configuration that supplies default call parameters.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, LogFormat};
pub use logging::{init_tracing, init_tracing_with};
