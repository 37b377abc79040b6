//! # Docket Core
//!
//! Foundational types shared by every Docket crate: the unified
//! application error, result aliases and logging initialisation.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_logging, LogFormat, TelemetryConfig};

// Re-export shaku for dependency injection
pub use shaku::Interface;
