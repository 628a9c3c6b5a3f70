//! The outbound gateway.
//!
//! Binds integration configs to the event bus: one async listener per
//! declared lifecycle event of every active config, registered under
//! `"{object}.{event}"`. The gateway does no mapping or vendor I/O itself;
//! listeners hand the event to a [`SyncHandler`].

use crate::bound::BoundIntegration;
use crate::error::GatewayError;
use crate::sync::SyncHandler;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use syncbridge_core::ListenerId;
use syncbridge_events::{Event, EventBus, ListenerFault};
use syncbridge_mapping::{ConfigValidator, IntegrationConfig, LifecycleEvent};
use tracing::{debug, info, instrument};

/// Bus event name for a lifecycle event of `object`.
#[must_use]
pub fn event_name(object: &str, event: LifecycleEvent) -> String {
    format!("{object}.{event}")
}

/// Registers integration configs as event bus listeners.
pub struct OutboundGateway {
    configs: BTreeMap<String, IntegrationConfig>,
    bus: Arc<EventBus>,
    default_handler: Arc<dyn SyncHandler>,
    handlers: HashMap<String, Arc<dyn SyncHandler>>,
    registered: Mutex<Vec<(String, ListenerId)>>,
}

impl OutboundGateway {
    /// Creates a gateway over `configs`, keyed by internal object name.
    pub fn new<I, S>(configs: I, bus: Arc<EventBus>, default_handler: Arc<dyn SyncHandler>) -> Self
    where
        I: IntoIterator<Item = (S, IntegrationConfig)>,
        S: Into<String>,
    {
        Self {
            configs: configs
                .into_iter()
                .map(|(object, config)| (object.into(), config))
                .collect(),
            bus,
            default_handler,
            handlers: HashMap::new(),
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Adds a named handler that events can select with `handler`.
    #[must_use]
    pub fn with_handler(mut self, name: impl Into<String>, handler: Arc<dyn SyncHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// The bus listeners are registered on.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Number of listeners this gateway currently has registered.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Validates every config, then registers listeners for the active ones.
    ///
    /// Nothing is registered unless every config is valid and every named
    /// handler exists. Calling this again after a successful registration
    /// registers nothing. Returns the number of listeners registered.
    ///
    /// # Errors
    ///
    /// Returns the first invalid config or unknown handler.
    #[instrument(skip(self), fields(configs = self.configs.len()))]
    pub fn register_events(&self) -> syncbridge_core::Result<usize, GatewayError> {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !registered.is_empty() {
            debug!("events already registered");
            return Ok(0);
        }

        let mut plan = Vec::new();
        for (object, config) in &self.configs {
            ConfigValidator::validate_config(config).map_err(|reason| {
                GatewayError::InvalidConfig {
                    object: object.clone(),
                    reason,
                }
            })?;
            if !config.active {
                debug!(%object, "skipping inactive integration");
                continue;
            }

            let integration = Arc::new(BoundIntegration::new(object.clone(), config.clone()));
            for binding in &config.events {
                let handler = match &binding.handler {
                    None => Arc::clone(&self.default_handler),
                    Some(name) => self.handlers.get(name).cloned().ok_or_else(|| {
                        GatewayError::UnknownHandler {
                            object: object.clone(),
                            event: binding.name,
                            handler: name.clone(),
                        }
                    })?,
                };
                plan.push((Arc::clone(&integration), binding.name, handler));
            }
        }

        for (integration, lifecycle, handler) in plan {
            let name = event_name(integration.object(), lifecycle);
            let id = self.bus.on_async(name.clone(), move |event: Event| {
                let integration = Arc::clone(&integration);
                let handler = Arc::clone(&handler);
                async move {
                    handler
                        .handle(integration.object(), &integration, lifecycle, &event)
                        .await
                        .map_err(|err| ListenerFault::from_error(&err))
                }
            });
            registered.push((name, id));
        }

        info!(listeners = registered.len(), "integration events registered");
        Ok(registered.len())
    }

    /// Removes every listener this gateway registered. Returns how many were
    /// removed.
    pub fn unregister_events(&self) -> usize {
        let registered: Vec<_> = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        registered
            .into_iter()
            .filter(|(name, id)| self.bus.off(name, *id))
            .count()
    }

    /// Registers events, then starts the bus so the ambient event (if any)
    /// is dispatched. Returns whether an ambient event was dispatched.
    ///
    /// # Errors
    ///
    /// Returns a registration error, or the ambient dispatch fault in
    /// immediate fault mode.
    pub async fn initialize(&self) -> syncbridge_core::Result<bool, GatewayError> {
        self.register_events()?;
        match self.bus.start().await {
            Ok(dispatched) => Ok(dispatched),
            Err(_) => {
                let reason = self
                    .bus
                    .last_fault()
                    .map_or_else(|| "unknown fault".to_string(), |fault| fault.to_string());
                Err(GatewayError::AmbientDispatch { reason }.into())
            }
        }
    }
}

impl std::fmt::Debug for OutboundGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundGateway")
            .field("objects", &self.configs.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("registered", &self.registered_count())
            .finish_non_exhaustive()
    }
}
