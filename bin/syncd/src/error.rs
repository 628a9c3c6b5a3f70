//! Error types for the daemon.

use std::fmt;

/// Errors that stop a synchronization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncdError {
    /// The configuration could not be loaded or is unusable.
    Config { reason: String },
    /// The integrations file could not be read or parsed.
    Integrations { path: String, reason: String },
    /// The vendor adapter could not be built.
    Vendor { reason: String },
    /// Registration or ambient dispatch failed.
    Gateway { reason: String },
    /// Listener faults were escalated during the run.
    Faults { count: u64 },
}

impl fmt::Display for SyncdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Integrations { path, reason } => {
                write!(f, "failed to load integrations from '{path}': {reason}")
            }
            Self::Vendor { reason } => write!(f, "failed to build vendor adapter: {reason}"),
            Self::Gateway { reason } => write!(f, "gateway failed: {reason}"),
            Self::Faults { count } => write!(f, "{count} synchronization(s) failed"),
        }
    }
}

impl std::error::Error for SyncdError {}
