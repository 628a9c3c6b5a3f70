//! Event dispatch for syncbridge.
//!
//! This crate provides:
//!
//! - **Event bus**: Ordered listeners per event name, synchronous or async
//! - **Dispatch modes**: Awaited dispatch (`emit`) and fire-and-detach
//!   dispatch (`fire`) with an explicit join-or-ignore handle
//! - **Fault modes**: Immediate, delayed or silent handling of listener
//!   faults, with a diagnostic slot and an escalation channel
//! - **Ambient event**: One event supplied by the hosting context and
//!   auto-dispatched exactly once on start

pub mod bus;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod fault;

pub use bus::{BusConfig, Completion, EventBus};
pub use context::{AmbientEvent, Event};
pub use dispatch::DetachedDispatch;
pub use error::{Fault, ListenerFault};
pub use fault::FaultMode;
