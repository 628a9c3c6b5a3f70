//! Handle for a fire-and-detach dispatch.

use crate::error::Fault;
use syncbridge_core::{DispatchId, ListenerId};
use tokio::task::JoinHandle;
use tracing::debug;

/// Deferred listener work started by [`EventBus::fire`](crate::EventBus::fire).
///
/// Faults from the deferred work are routed through the bus's fault mode
/// whether or not the handle is joined. Joining additionally collects them;
/// detaching lets the work finish in the background.
#[derive(Debug)]
#[must_use = "join the dispatch or detach it explicitly"]
pub struct DetachedDispatch {
    id: DispatchId,
    event: String,
    tasks: Vec<(ListenerId, JoinHandle<Result<(), Fault>>)>,
}

impl DetachedDispatch {
    pub(crate) fn new(id: DispatchId, event: String) -> Self {
        Self {
            id,
            event,
            tasks: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, listener: ListenerId, task: JoinHandle<Result<(), Fault>>) {
        self.tasks.push((listener, task));
    }

    /// The dispatch this handle belongs to.
    #[must_use]
    pub fn id(&self) -> DispatchId {
        self.id
    }

    /// Number of deferred listener tasks started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for all deferred work and returns the faults it produced, in
    /// listener registration order.
    pub async fn join(self) -> Vec<Fault> {
        let mut faults = Vec::new();
        for (listener, task) in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(fault)) => faults.push(fault),
                Err(join_error) => faults.push(Fault {
                    event: self.event.clone(),
                    listener,
                    dispatch: self.id,
                    message: format!("listener task did not complete: {join_error}"),
                }),
            }
        }
        faults
    }

    /// Lets the deferred work run to completion in the background.
    pub fn detach(self) {
        debug!(dispatch = %self.id, tasks = self.tasks.len(), "dispatch detached");
    }
}
