//! Field mapping and integration configuration for syncbridge.
//!
//! This crate provides:
//!
//! - **Field mapper**: Stateless, bidirectional mapping between nested
//!   records with per-field transforms
//! - **Integration config**: Declarative binding of an internal object to a
//!   vendor object and its lifecycle events
//! - **Config validator**: Schema checks and per-event transform resolution

pub mod config;
pub mod error;
pub mod field_map;
pub mod mapper;
pub mod transform;
pub mod validator;

pub use config::{EventBinding, IntegrationConfig, LifecycleEvent};
pub use error::{ConfigError, MappingError};
pub use field_map::{FieldMap, FieldMapping};
pub use mapper::{Direction, FieldMapper};
pub use transform::{Transform, TransformRegistry, TransformSet};
pub use validator::{ConfigValidator, ResolvedTransforms};
