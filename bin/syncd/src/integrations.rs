//! Integration declarations file.
//!
//! A JSON object mapping internal object names to integration
//! declarations:
//!
//! ```json
//! {
//!   "contact": {
//!     "source": "contact",
//!     "target": "Contact",
//!     "map": {"firstName": "FirstName"},
//!     "events": [{"name": "afterCreate"}]
//!   }
//! }
//! ```

use crate::error::SyncdError;
use rootcause::prelude::Report;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use syncbridge_mapping::{IntegrationConfig, TransformRegistry};

/// Reads and parses the declarations file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any declaration is
/// invalid.
pub fn load_integrations(
    path: &Path,
    registry: &TransformRegistry,
) -> Result<BTreeMap<String, IntegrationConfig>, Report<SyncdError>> {
    let failed = |reason: String| SyncdError::Integrations {
        path: path.display().to_string(),
        reason,
    };
    let source = std::fs::read_to_string(path).map_err(|e| failed(e.to_string()))?;
    Ok(parse_integrations(&source, registry).map_err(failed)?)
}

/// Parses declarations from JSON text.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn parse_integrations(
    source: &str,
    registry: &TransformRegistry,
) -> Result<BTreeMap<String, IntegrationConfig>, String> {
    let value: Value = serde_json::from_str(source).map_err(|e| e.to_string())?;
    let Value::Object(declarations) = value else {
        return Err("expected an object keyed by object name".to_string());
    };

    declarations
        .iter()
        .map(|(object, declaration)| {
            IntegrationConfig::from_declaration(declaration, registry)
                .map(|config| (object.clone(), config))
                .map_err(|e| format!("'{object}': {e}"))
        })
        .collect()
}
