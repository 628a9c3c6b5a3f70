//! Outbound synchronization for syncbridge.
//!
//! This crate provides:
//!
//! - **Outbound gateway**: Registers one event bus listener per lifecycle
//!   event of every active integration
//! - **Bound integrations**: Configs with registration defaults applied and
//!   the per-event transform resolution used for mapping
//! - **Sync handlers**: The adapter-backed handler that creates, updates and
//!   deletes vendor records

pub mod bound;
pub mod error;
pub mod gateway;
pub mod sync;

pub use bound::BoundIntegration;
pub use error::{GatewayError, SyncError};
pub use gateway::{OutboundGateway, event_name};
pub use sync::{
    AdapterSyncHandler, CreatedReference, DEFAULT_REF_ID_FIELD, ReferenceSink, SyncHandler,
};
