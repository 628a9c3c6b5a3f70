//! One synchronization run.
//!
//! Wires the configured vendor adapter into an outbound gateway, dispatches
//! the ambient event and reports the faults the fault mode lets through.

use crate::config::SyncdConfig;
use crate::error::SyncdError;
use crate::integrations::load_integrations;
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use syncbridge_events::{EventBus, FaultMode};
use syncbridge_gateway::{AdapterSyncHandler, OutboundGateway, SyncHandler};
use syncbridge_integration::{CredentialStore, InMemoryCredentialStore, build_adapter};
use syncbridge_mapping::{IntegrationConfig, TransformRegistry};
use tracing::{error, info, warn};

/// How long to wait for a delayed fault to arrive on the fault channel.
const FAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Loads the integrations file named in `config`, then runs.
///
/// # Errors
///
/// See [`run_with`].
pub async fn run(config: SyncdConfig) -> Result<(), Report<SyncdError>> {
    let registry = TransformRegistry::with_builtins();
    let integrations = load_integrations(&config.integrations_path, &registry)?;
    info!(
        integrations = integrations.len(),
        path = %config.integrations_path.display(),
        "Loaded integrations"
    );
    run_with(&config, integrations).await
}

/// Registers `integrations` and dispatches the ambient event.
///
/// Events naming the vendor as their handler (`"handler": "hubspot"`) and
/// events with no handler both go to the adapter-backed handler.
///
/// # Errors
///
/// Returns an error if the adapter cannot be built, registration fails, the
/// ambient dispatch faults in immediate mode, or faults are escalated in
/// delayed mode.
pub async fn run_with(
    config: &SyncdConfig,
    integrations: BTreeMap<String, IntegrationConfig>,
) -> Result<(), Report<SyncdError>> {
    let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
    let adapter = build_adapter(&config.vendor, Some(store), &config.environment)
        .map_err(|e| SyncdError::Vendor {
            reason: e.to_string(),
        })?;
    let vendor = adapter.vendor().to_string();

    let bus = Arc::new(EventBus::new(config.bus_config()?));
    let mut faults = bus.take_fault_receiver();

    let handler: Arc<dyn SyncHandler> = Arc::new(
        AdapterSyncHandler::new(adapter).with_ref_id_field(config.ref_id_field.clone()),
    );
    let gateway = OutboundGateway::new(integrations, Arc::clone(&bus), Arc::clone(&handler))
        .with_handler(vendor, handler);

    let dispatched = gateway
        .initialize()
        .await
        .map_err(|report| SyncdError::Gateway {
            reason: report.to_string(),
        })?;
    if !dispatched {
        warn!("no ambient event configured, nothing to synchronize");
        return Ok(());
    }

    let mut escalated = 0;
    if let Some(receiver) = faults.as_mut() {
        while escalated < bus.fault_count() {
            match tokio::time::timeout(FAULT_DRAIN_TIMEOUT, receiver.recv()).await {
                Ok(Some(fault)) => {
                    error!(%fault, "synchronization failed");
                    escalated += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }
    }

    match bus.fault_mode() {
        FaultMode::Silent if bus.fault_count() > 0 => {
            warn!(faults = bus.fault_count(), "synchronization faults suppressed");
        }
        FaultMode::Delayed if escalated > 0 => {
            return Err(SyncdError::Faults { count: escalated }.into());
        }
        _ => {}
    }
    info!("synchronization run complete");
    Ok(())
}
