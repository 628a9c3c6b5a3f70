//! The event bus.
//!
//! Listeners are kept per event name in registration order. A listener is
//! invoked synchronously and either finishes there or hands back deferred
//! work. The two dispatch modes differ only in what happens to that work:
//! [`EventBus::emit`] awaits it before moving to the next listener,
//! [`EventBus::fire`] spawns it and returns a [`DetachedDispatch`].

use crate::context::{AmbientEvent, Event};
use crate::dispatch::DetachedDispatch;
use crate::error::{Fault, ListenerFault};
use crate::fault::{FaultMode, FaultSink};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use syncbridge_core::ListenerId;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// What a listener hands back after its synchronous part ran.
pub enum Completion {
    /// The listener is finished.
    Done,
    /// The listener has more work to do.
    Deferred(BoxFuture<'static, Result<(), ListenerFault>>),
}

impl Completion {
    /// Wraps a future as deferred work.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), ListenerFault>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

type Handler = Arc<dyn Fn(&Event) -> Result<Completion, ListenerFault> + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    handler: Handler,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Bus construction options.
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    /// How listener faults are surfaced.
    pub fault_mode: FaultMode,
    /// Event supplied by the hosting context, dispatched once on start.
    pub ambient: Option<AmbientEvent>,
}

impl BusConfig {
    /// Sets the fault mode.
    #[must_use]
    pub fn with_fault_mode(mut self, fault_mode: FaultMode) -> Self {
        self.fault_mode = fault_mode;
        self
    }

    /// Sets the ambient event.
    #[must_use]
    pub fn with_ambient(mut self, ambient: AmbientEvent) -> Self {
        self.ambient = Some(ambient);
        self
    }
}

/// Ordered publish/subscribe dispatcher.
#[derive(Debug)]
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    faults: Arc<FaultSink>,
    ambient: Option<AmbientEvent>,
    started: AtomicBool,
}

impl EventBus {
    /// Creates a bus.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            faults: Arc::new(FaultSink::new(config.fault_mode)),
            ambient: config.ambient,
            started: AtomicBool::new(false),
        }
    }

    /// The configured fault mode.
    #[must_use]
    pub fn fault_mode(&self) -> FaultMode {
        self.faults.mode()
    }

    /// Registers a synchronous listener.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> Result<(), ListenerFault> + Send + Sync + 'static,
    {
        self.on_completion(event, move |e| handler(e).map(|()| Completion::Done))
    }

    /// Registers an async listener. It receives its own copy of the event.
    pub fn on_async<F, Fut>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerFault>> + Send + 'static,
    {
        self.on_completion(event, move |e| Ok(Completion::deferred(handler(e.clone()))))
    }

    /// Registers a listener that decides per call whether it defers work.
    pub fn on_completion<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> Result<Completion, ListenerFault> + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        let event = event.into();
        debug!(%event, listener = %id, "listener registered");
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(Listener {
                id,
                handler: Arc::new(handler),
            });
        id
    }

    /// Removes one listener. Returns false if it was not registered for
    /// `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = listeners.get_mut(event) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|listener| listener.id != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// The most recent listener fault, whatever the fault mode.
    #[must_use]
    pub fn last_fault(&self) -> Option<Fault> {
        self.faults.last()
    }

    /// Number of listener faults seen so far.
    #[must_use]
    pub fn fault_count(&self) -> u64 {
        self.faults.count()
    }

    /// Takes the receiving end of the fault channel.
    ///
    /// Returns `None` after the first call. While nobody holds the receiver,
    /// escalated faults are logged instead.
    pub fn take_fault_receiver(&self) -> Option<mpsc::UnboundedReceiver<Fault>> {
        self.faults.take_receiver()
    }

    /// Dispatches the ambient event, once.
    ///
    /// Returns whether a dispatch happened. Calls after the first, including
    /// calls made from inside a listener, do nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener faults in immediate mode.
    pub async fn start(&self) -> syncbridge_core::Result<bool, Fault> {
        let Some(ambient) = &self.ambient else {
            return Ok(false);
        };
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        debug!(event = %ambient.name, "dispatching ambient event");
        self.emit(&ambient.name, ambient.payload.clone()).await?;
        Ok(true)
    }

    /// Awaited dispatch.
    ///
    /// Listeners run strictly in registration order; deferred work of one
    /// listener settles before the next listener is invoked. A fault goes
    /// through the fault mode before the next listener runs.
    ///
    /// # Errors
    ///
    /// In immediate mode, returns the first fault; later listeners are not
    /// invoked.
    #[instrument(skip(self, payload))]
    pub async fn emit(&self, event: &str, payload: Value) -> syncbridge_core::Result<(), Fault> {
        let event = Event::new(event, payload);
        for listener in self.snapshot(&event.name) {
            let outcome = match (listener.handler)(&event) {
                Ok(Completion::Done) => Ok(()),
                Ok(Completion::Deferred(work)) => work.await,
                Err(fault) => Err(fault),
            };
            if let Err(fault) = outcome {
                self.faults
                    .handle_inline(fault_for(&event, listener.id, fault))?;
            }
        }
        Ok(())
    }

    /// Fire-with-deferred-fault dispatch.
    ///
    /// Every listener is invoked synchronously, in order. Deferred work is
    /// spawned onto the current runtime; its faults are escalated through
    /// the fault channel rather than returned here.
    ///
    /// # Errors
    ///
    /// In immediate mode, returns the first synchronous fault; later
    /// listeners are not invoked. Deferred work already spawned keeps
    /// running.
    pub fn fire(
        &self,
        event: &str,
        payload: Value,
    ) -> syncbridge_core::Result<DetachedDispatch, Fault> {
        let event = Event::new(event, payload);
        let mut dispatch = DetachedDispatch::new(event.dispatch, event.name.clone());
        let runtime = Handle::try_current().ok();

        for listener in self.snapshot(&event.name) {
            let work = match (listener.handler)(&event) {
                Ok(Completion::Done) => continue,
                Ok(Completion::Deferred(work)) => work,
                Err(fault) => {
                    self.faults
                        .handle_inline(fault_for(&event, listener.id, fault))?;
                    continue;
                }
            };

            let Some(runtime) = &runtime else {
                let fault = ListenerFault::new("no async runtime to run deferred listener work");
                self.faults
                    .handle_inline(fault_for(&event, listener.id, fault))?;
                continue;
            };

            let sink = Arc::clone(&self.faults);
            let (name, dispatch_id, id) = (event.name.clone(), event.dispatch, listener.id);
            let task = runtime.spawn(async move {
                work.await.map_err(|fault| {
                    let fault = Fault {
                        event: name,
                        listener: id,
                        dispatch: dispatch_id,
                        message: fault.message().to_string(),
                    };
                    sink.handle_deferred(&fault);
                    fault
                })
            });
            dispatch.push(listener.id, task);
        }

        Ok(dispatch)
    }

    fn snapshot(&self, event: &str) -> Vec<Listener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

fn fault_for(event: &Event, listener: ListenerId, fault: ListenerFault) -> Fault {
    Fault {
        event: event.name.clone(),
        listener,
        dispatch: event.dispatch,
        message: fault.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().expect("log lock").clone()
    }

    fn bus(mode: FaultMode) -> EventBus {
        EventBus::new(BusConfig::default().with_fault_mode(mode))
    }

    fn record(
        log: &Log,
        entry: &'static str,
    ) -> impl Fn(&Event) -> Result<(), ListenerFault> + Send + Sync + 'static + use<> {
        let log = Arc::clone(log);
        move |_| {
            log.lock().expect("log lock").push(entry.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn emit_awaits_each_listener_in_order() {
        let bus = bus(FaultMode::Immediate);
        let calls = log();

        let slow = Arc::clone(&calls);
        bus.on_async("ping", move |_| {
            let slow = Arc::clone(&slow);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                slow.lock().expect("log lock").push("slow".to_string());
                Ok(())
            }
        });
        bus.on("ping", record(&calls, "fast"));

        bus.emit("ping", json!({})).await.expect("no faults");
        assert_eq!(entries(&calls), ["slow", "fast"]);
    }

    #[tokio::test]
    async fn listeners_receive_payload() {
        let bus = EventBus::default();
        let seen = log();
        let sink = Arc::clone(&seen);
        bus.on("contact.afterCreate", move |event| {
            let name = event.payload["firstName"].as_str().unwrap_or_default();
            sink.lock().expect("log lock").push(name.to_string());
            Ok(())
        });

        bus.emit("contact.afterCreate", json!({"firstName": "Ada"}))
            .await
            .expect("no faults");
        assert_eq!(entries(&seen), ["Ada"]);
    }

    #[tokio::test]
    async fn immediate_mode_stops_at_first_fault() {
        let bus = bus(FaultMode::Immediate);
        let calls = log();
        bus.on("ping", |_| Err(ListenerFault::new("boom")));
        bus.on("ping", record(&calls, "second"));

        assert!(bus.emit("ping", Value::Null).await.is_err());
        assert!(entries(&calls).is_empty());
        assert_eq!(bus.last_fault().expect("recorded").message, "boom");
    }

    #[tokio::test]
    async fn immediate_mode_surfaces_async_fault_before_next_listener() {
        let bus = bus(FaultMode::Immediate);
        let calls = log();
        bus.on_async("ping", |_| async { Err(ListenerFault::new("rejected")) });
        bus.on("ping", record(&calls, "second"));

        assert!(bus.emit("ping", Value::Null).await.is_err());
        assert!(entries(&calls).is_empty());
    }

    #[tokio::test]
    async fn silent_mode_never_raises() {
        let bus = bus(FaultMode::Silent);
        let calls = log();
        bus.on("ping", |_| Err(ListenerFault::new("sync fault")));
        bus.on_async("ping", |_| async { Err(ListenerFault::new("async fault")) });
        bus.on("ping", record(&calls, "third"));

        bus.emit("ping", Value::Null).await.expect("silent");
        let dispatch = bus.fire("ping", Value::Null).expect("silent");
        let deferred = dispatch.join().await;

        assert_eq!(entries(&calls), ["third", "third"]);
        assert_eq!(deferred.len(), 1);
        assert_eq!(bus.fault_count(), 4);
        assert!(bus.last_fault().is_some());
    }

    #[tokio::test]
    async fn delayed_mode_escalates_through_channel() {
        let bus = bus(FaultMode::Delayed);
        let mut faults = bus.take_fault_receiver().expect("first take");
        let calls = log();
        bus.on("ping", |_| Err(ListenerFault::new("later")));
        bus.on("ping", record(&calls, "second"));

        bus.emit("ping", Value::Null).await.expect("delayed");
        assert_eq!(entries(&calls), ["second"]);

        let fault = faults.recv().await.expect("escalated fault");
        assert_eq!(fault.message, "later");
        assert_eq!(fault.event, "ping");
    }

    #[test]
    fn fault_receiver_can_only_be_taken_once() {
        let bus = EventBus::default();
        assert!(bus.take_fault_receiver().is_some());
        assert!(bus.take_fault_receiver().is_none());
    }

    #[test]
    fn fire_propagates_sync_fault_synchronously_in_immediate_mode() {
        let bus = bus(FaultMode::Immediate);
        let calls = log();
        bus.on("ping", |_| Err(ListenerFault::new("boom")));
        bus.on("ping", record(&calls, "second"));

        assert!(bus.fire("ping", Value::Null).is_err());
        assert!(entries(&calls).is_empty());
    }

    #[test]
    fn fire_without_runtime_runs_sync_listeners() {
        let bus = bus(FaultMode::Immediate);
        let calls = log();
        bus.on("ping", record(&calls, "a"));
        bus.on("ping", record(&calls, "b"));

        let dispatch = bus.fire("ping", Value::Null).expect("no faults");
        assert_eq!(dispatch.pending(), 0);
        dispatch.detach();
        assert_eq!(entries(&calls), ["a", "b"]);
    }

    #[tokio::test]
    async fn fire_escalates_deferred_faults_and_join_collects_them() {
        let bus = bus(FaultMode::Immediate);
        let mut faults = bus.take_fault_receiver().expect("first take");
        bus.on_async("ping", |_| async { Err(ListenerFault::new("async boom")) });
        bus.on_async("ping", |_| async { Ok(()) });

        let dispatch = bus.fire("ping", Value::Null).expect("sync part succeeded");
        assert_eq!(dispatch.pending(), 2);
        let joined = dispatch.join().await;

        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].message, "async boom");
        let escalated = faults.recv().await.expect("escalated");
        assert_eq!(escalated, joined[0]);
    }

    #[tokio::test]
    async fn detached_work_still_runs() {
        let bus = bus(FaultMode::Silent);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        bus.on_async("ping", move |_| {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().expect("sender lock").take() {
                    let _ = tx.send(());
                }
                Ok(())
            }
        });

        bus.fire("ping", Value::Null).expect("no faults").detach();
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("ran in time")
            .expect("sender kept");
    }

    #[test]
    fn off_removes_exactly_one_listener() {
        let bus = EventBus::default();
        let calls = log();
        let first = bus.on("ping", record(&calls, "first"));
        bus.on("ping", record(&calls, "second"));

        assert!(bus.off("ping", first));
        assert!(!bus.off("ping", first));
        assert!(!bus.off("other", first));
        assert_eq!(bus.listener_count("ping"), 1);

        bus.fire("ping", Value::Null).expect("no faults").detach();
        assert_eq!(entries(&calls), ["second"]);
    }

    #[test]
    fn clear_removes_everything() {
        let bus = EventBus::default();
        bus.on("a", |_| Ok(()));
        bus.on("b", |_| Ok(()));
        bus.clear();
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 0);
    }

    #[tokio::test]
    async fn start_dispatches_ambient_event_once() {
        let bus = EventBus::new(
            BusConfig::default().with_ambient(AmbientEvent::new("deal.afterUpdate", json!({"id": 7}))),
        );
        let calls = log();
        bus.on("deal.afterUpdate", record(&calls, "sync"));

        assert!(bus.start().await.expect("no faults"));
        assert!(!bus.start().await.expect("no faults"));
        assert_eq!(entries(&calls), ["sync"]);
    }

    #[tokio::test]
    async fn start_without_ambient_event_does_nothing() {
        let bus = EventBus::default();
        assert!(!bus.start().await.expect("no faults"));
    }

    #[tokio::test]
    async fn listener_may_register_during_dispatch() {
        let bus = Arc::new(EventBus::default());
        let inner = Arc::clone(&bus);
        bus.on("ping", move |_| {
            inner.on("pong", |_| Ok(()));
            Ok(())
        });

        bus.emit("ping", Value::Null).await.expect("no faults");
        assert_eq!(bus.listener_count("pong"), 1);
    }
}
