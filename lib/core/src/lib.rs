//! Core types and utilities for the syncbridge outbound synchronization
//! framework.
//!
//! This crate provides the foundational pieces shared by every other
//! syncbridge crate: the rootcause-backed `Result` alias, strongly-typed
//! identifiers, and the `Record` representation with nested-path helpers.

pub mod error;
pub mod id;
pub mod record;

pub use error::Result;
pub use id::{DispatchId, ListenerId};
pub use record::{Record, get_path, remove_path, set_path};
