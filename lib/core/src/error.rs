//! Error handling foundation for syncbridge.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error types in their own
//! error modules; registration and dispatch layers wrap them in a
//! `Report` as errors propagate up to the daemon.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
