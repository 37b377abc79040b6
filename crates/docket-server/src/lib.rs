//! # Docket Server Library
//!
//! Wires the job engine together from configuration and provides
//! startup utilities for the server binary.

pub mod app;
pub mod startup;
