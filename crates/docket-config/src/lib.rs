//! # Docket Config
//!
//! Configuration management for Docket.
//! Supports layered configuration from files and environment variables,
//! validation that reports every problem at once, and runtime reload.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
