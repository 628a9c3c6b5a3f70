//! Error types for the mapping crate.
//!
//! - `MappingError`: Malformed input handed to the field mapper
//! - `ConfigError`: Integration declarations that fail schema validation

use std::fmt;

/// Errors from field mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// Input that must be a plain object was something else.
    NotAnObject { what: &'static str },
    /// A field map declaration entry is malformed.
    InvalidFieldMap { key: String, reason: String },
    /// The same source path was mapped twice.
    DuplicateMapping { key: String },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { what } => {
                write!(f, "{what} must be a plain object")
            }
            Self::InvalidFieldMap { key, reason } => {
                write!(f, "invalid field map entry '{key}': {reason}")
            }
            Self::DuplicateMapping { key } => {
                write!(f, "field '{key}' is mapped more than once")
            }
        }
    }
}

impl std::error::Error for MappingError {}

/// Errors from integration config validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field is absent or empty.
    MissingField { field: String },
    /// A field has the wrong JSON type.
    InvalidType {
        field: String,
        expected: &'static str,
    },
    /// The config declares no events.
    NoEvents,
    /// An event name outside the lifecycle enumeration.
    UnknownEvent { name: String },
    /// Two events in one config share a name.
    DuplicateEvent { name: String },
    /// A named transform is not in the registry.
    UnknownTransform { name: String },
    /// The field map is malformed.
    Mapping(MappingError),
    /// A config in a list failed validation.
    InvalidConfig {
        index: usize,
        source_name: String,
        reason: Box<ConfigError>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            Self::InvalidType { field, expected } => {
                write!(f, "field '{field}' must be {expected}")
            }
            Self::NoEvents => write!(f, "'events' must declare at least one event"),
            Self::UnknownEvent { name } => {
                write!(
                    f,
                    "unknown event '{name}', expected one of afterCreate, afterUpdate, afterDelete"
                )
            }
            Self::DuplicateEvent { name } => {
                write!(f, "event '{name}' is declared more than once")
            }
            Self::UnknownTransform { name } => {
                write!(f, "unknown transform '{name}'")
            }
            Self::Mapping(err) => write!(f, "{err}"),
            Self::InvalidConfig {
                index,
                source_name,
                reason,
            } => {
                write!(
                    f,
                    "integration config at index {index} (source '{source_name}') is invalid: {reason}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<MappingError> for ConfigError {
    fn from(err: MappingError) -> Self {
        Self::Mapping(err)
    }
}
