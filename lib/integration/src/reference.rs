//! Cross-reference links back to vendor records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier and UI link of a vendor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefData {
    /// Vendor record id.
    pub ref_id: String,
    /// Link to the record in the vendor's UI.
    pub ref_url: String,
}

/// A vendor UI URL template with `{type}` and `{id}` placeholders.
///
/// Object types are rewritten through an alias table before substitution,
/// so an API name such as `contacts` can land on the UI path `contact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUrlTemplate {
    template: String,
    aliases: HashMap<String, String>,
}

impl RefUrlTemplate {
    /// Creates a template without aliases.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            aliases: HashMap::new(),
        }
    }

    /// Adds an object-type alias.
    #[must_use]
    pub fn alias(mut self, object_type: impl Into<String>, path: impl Into<String>) -> Self {
        self.aliases.insert(object_type.into(), path.into());
        self
    }

    /// The UI path segment used for `object_type`.
    #[must_use]
    pub fn resolve_type<'a>(&'a self, object_type: &'a str) -> &'a str {
        self.aliases
            .get(object_type)
            .map_or(object_type, String::as_str)
    }

    /// Renders the URL for one record.
    #[must_use]
    pub fn render(&self, object_type: &str, id: &str) -> String {
        self.template
            .replace("{type}", self.resolve_type(object_type))
            .replace("{id}", id)
    }

    /// Renders the full reference pair.
    #[must_use]
    pub fn ref_data(&self, object_type: &str, id: &str) -> RefData {
        RefData {
            ref_id: id.to_string(),
            ref_url: self.render(object_type, id),
        }
    }
}
