//! Vendor selection.
//!
//! The set of vendors is fixed at compile time; configuration picks one by
//! name and supplies its settings.

use crate::adapter::VendorAdapter;
use crate::credential::CredentialStore;
use crate::error::AdapterResult;
use crate::vendors::{HubspotAdapter, HubspotSettings, SalesforceAdapter, SalesforceSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Settings for one supported vendor, keyed by vendor name.
///
/// ```json
/// { "salesforce": { "instance_url": "...", "client_id": "...", "client_secret": "..." } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorSettings {
    /// Salesforce org.
    Salesforce(SalesforceSettings),
    /// HubSpot portal.
    Hubspot(HubspotSettings),
}

impl VendorSettings {
    /// The vendor's name.
    #[must_use]
    pub fn vendor(&self) -> &'static str {
        match self {
            Self::Salesforce(_) => crate::vendors::salesforce::VENDOR,
            Self::Hubspot(_) => crate::vendors::hubspot::VENDOR,
        }
    }
}

/// Builds the adapter for `settings`.
///
/// # Errors
///
/// Returns a config error if the settings are unusable.
pub fn build_adapter(
    settings: &VendorSettings,
    store: Option<Arc<dyn CredentialStore>>,
    environment: &str,
) -> AdapterResult<Arc<dyn VendorAdapter>> {
    info!(vendor = settings.vendor(), %environment, "building vendor adapter");
    let adapter: Arc<dyn VendorAdapter> = match settings {
        VendorSettings::Salesforce(settings) => {
            Arc::new(SalesforceAdapter::new(settings, store, environment)?)
        }
        VendorSettings::Hubspot(settings) => {
            Arc::new(HubspotAdapter::new(settings, store, environment)?)
        }
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn settings_are_keyed_by_vendor() {
        let settings: VendorSettings = serde_json::from_value(json!({
            "hubspot": {
                "portal_id": "4412",
                "auth": {"oauth": {
                    "client_id": "id",
                    "client_secret": "secret",
                    "initial_grant": {"type": "refresh_token", "value": "rt"}
                }}
            }
        }))
        .expect("deserialize");
        assert_eq!(settings.vendor(), "hubspot");

        let adapter = build_adapter(&settings, None, "production").expect("adapter");
        assert_eq!(adapter.vendor(), "hubspot");
    }

    #[test]
    fn salesforce_defaults() {
        let settings: VendorSettings = serde_json::from_value(json!({
            "salesforce": {
                "instance_url": "https://acme.my.salesforce.com/",
                "client_id": "id",
                "client_secret": "secret"
            }
        }))
        .expect("deserialize");
        let VendorSettings::Salesforce(salesforce) = &settings else {
            panic!("expected salesforce settings");
        };
        assert_eq!(salesforce.api_version, "60.0");

        let adapter = build_adapter(&settings, None, "sandbox").expect("adapter");
        assert_eq!(
            adapter.get_ref_url("Account", "001"),
            "https://acme.my.salesforce.com/lightning/r/Account/001/view"
        );
    }

    #[test]
    fn invalid_urls_are_config_errors() {
        let settings = VendorSettings::Salesforce(SalesforceSettings::new("not a url", "id", "secret"));
        let err = build_adapter(&settings, None, "test").expect_err("invalid");
        assert_eq!(err.kind, ErrorKind::Config);
    }
}
