//! Core types and utilities for the SDN policy controller
//!
//! # Modules
//!
//! - `config`: Environment file and settings loading
//! - `error`: Error types and Result alias
//! - `types`: Identifiers and hardware addresses shared across crates

pub mod config;
pub mod error;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use types::*;
