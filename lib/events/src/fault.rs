//! Fault modes and the bus's fault sink.
//!
//! Every fault is recorded in a diagnostic slot and counted. What happens
//! next depends on the mode: immediate faults are returned to the dispatch
//! caller, delayed faults are escalated through the fault channel on a later
//! scheduler tick, silent faults stop at the diagnostic slot.

use crate::error::Fault;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// How listener faults are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultMode {
    /// Return the fault to the dispatch caller; remaining listeners are not
    /// invoked.
    #[default]
    Immediate,
    /// Escalate through the fault channel on the next scheduler tick.
    Delayed,
    /// Record the fault and carry on.
    Silent,
}

#[derive(Debug)]
pub(crate) struct FaultSink {
    mode: FaultMode,
    last: Mutex<Option<Fault>>,
    count: AtomicU64,
    sender: mpsc::UnboundedSender<Fault>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Fault>>>,
    receiver_taken: AtomicBool,
}

impl FaultSink {
    pub(crate) fn new(mode: FaultMode) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            mode,
            last: Mutex::new(None),
            count: AtomicU64::new(0),
            sender,
            receiver: Mutex::new(Some(receiver)),
            receiver_taken: AtomicBool::new(false),
        }
    }

    pub(crate) fn mode(&self) -> FaultMode {
        self.mode
    }

    pub(crate) fn last(&self) -> Option<Fault> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Fault>> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if receiver.is_some() {
            self.receiver_taken.store(true, Ordering::Release);
        }
        receiver
    }

    fn record(&self, fault: &Fault) {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault.clone());
    }

    /// Handles a fault raised while the dispatch caller is still present.
    ///
    /// Returns the fault back in immediate mode so the caller can stop.
    pub(crate) fn handle_inline(self: &Arc<Self>, fault: Fault) -> Result<(), Fault> {
        self.record(&fault);
        match self.mode {
            FaultMode::Immediate => Err(fault),
            FaultMode::Delayed => {
                match Handle::try_current() {
                    Ok(handle) => {
                        let sink = Arc::clone(self);
                        handle.spawn(async move {
                            tokio::task::yield_now().await;
                            sink.escalate(fault);
                        });
                    }
                    Err(_) => self.escalate(fault),
                }
                Ok(())
            }
            FaultMode::Silent => {
                debug!(%fault, "listener fault suppressed");
                Ok(())
            }
        }
    }

    /// Handles a fault from deferred work that nobody is waiting on inline.
    pub(crate) fn handle_deferred(&self, fault: &Fault) {
        self.record(fault);
        match self.mode {
            FaultMode::Immediate | FaultMode::Delayed => self.escalate(fault.clone()),
            FaultMode::Silent => debug!(%fault, "deferred listener fault suppressed"),
        }
    }

    pub(crate) fn escalate(&self, fault: Fault) {
        if !self.receiver_taken.load(Ordering::Acquire) {
            error!(%fault, "listener fault escalated");
            return;
        }
        if let Err(mpsc::error::SendError(fault)) = self.sender.send(fault) {
            error!(%fault, "listener fault escalated after fault receiver was dropped");
        }
    }
}
