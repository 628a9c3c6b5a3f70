//! Daemon wiring for syncbridge.
//!
//! Configuration loading, integration declarations and the synchronization
//! run itself; `main` only installs tracing and reports the outcome.

pub mod config;
pub mod daemon;
pub mod error;
pub mod integrations;
