//! Daemon configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys:
//!
//! ```text
//! ENVIRONMENT=staging
//! VENDOR__HUBSPOT__PORTAL_ID=4412
//! VENDOR__HUBSPOT__AUTH__PRIVATE_APP__TOKEN=pat-na1-...
//! BUS__FAULT_MODE=delayed
//! AMBIENT_EVENT__NAME=contact.afterCreate
//! AMBIENT_EVENT__PAYLOAD={"email":"ada@example.com"}
//! INTEGRATIONS_PATH=/etc/syncbridge/integrations.json
//! ```

use crate::error::SyncdError;
use serde::Deserialize;
use std::path::PathBuf;
use syncbridge_events::{AmbientEvent, BusConfig, FaultMode};
use syncbridge_gateway::DEFAULT_REF_ID_FIELD;
use syncbridge_integration::VendorSettings;

/// Daemon configuration.
#[derive(Debug, Deserialize)]
pub struct SyncdConfig {
    /// Deployment environment; part of every credential key.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// The vendor to synchronize with.
    pub vendor: VendorSettings,

    /// Event bus settings.
    #[serde(default)]
    pub bus: BusSettings,

    /// The event this run was started for.
    #[serde(default)]
    pub ambient_event: Option<AmbientEventConfig>,

    /// JSON file with the integration declarations, keyed by object name.
    #[serde(default = "default_integrations_path")]
    pub integrations_path: PathBuf,

    /// Field of internal records holding the vendor id.
    #[serde(default = "default_ref_id_field")]
    pub ref_id_field: String,
}

/// Event bus settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusSettings {
    /// How listener faults are surfaced.
    #[serde(default)]
    pub fault_mode: FaultMode,
}

/// The ambient event, with its payload as JSON text.
#[derive(Debug, Clone, Deserialize)]
pub struct AmbientEventConfig {
    /// Qualified event name, e.g. `contact.afterCreate`.
    pub name: String,

    /// JSON payload.
    #[serde(default = "default_payload")]
    pub payload: String,
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_integrations_path() -> PathBuf {
    PathBuf::from("integrations.json")
}

fn default_ref_id_field() -> String {
    DEFAULT_REF_ID_FIELD.to_string()
}

fn default_payload() -> String {
    "{}".to_string()
}

impl AmbientEventConfig {
    /// Parses the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON.
    pub fn to_event(&self) -> Result<AmbientEvent, SyncdError> {
        let payload = serde_json::from_str(&self.payload).map_err(|e| SyncdError::Config {
            reason: format!("ambient event payload is not valid JSON: {e}"),
        })?;
        Ok(AmbientEvent::new(self.name.clone(), payload))
    }
}

impl SyncdConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    /// Loads configuration from an environment source.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Bus configuration, including the parsed ambient event.
    ///
    /// # Errors
    ///
    /// Returns an error if the ambient payload is not valid JSON.
    pub fn bus_config(&self) -> Result<BusConfig, SyncdError> {
        let mut bus = BusConfig::default().with_fault_mode(self.bus.fault_mode);
        if let Some(ambient) = &self.ambient_event {
            bus = bus.with_ambient(ambient.to_event()?);
        }
        Ok(bus)
    }
}
