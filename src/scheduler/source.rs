//! Per-worker module source: the host-facing iterator over scheduled work.

use crate::scheduler::core::{InstanceId, ScheduledModule, SchedulerCore};
use std::sync::Arc;
use tracing::debug;

/// Hands a worker its modules one at a time.
///
/// `next()` is exactly a completion of the previously returned module
/// followed by a dequeue, so the driving loop can live inside the
/// externally hosted payload: the host keeps calling `next()` until it
/// returns `None`. A module whose payload errors is never completed; the
/// host abandons the loop and the driver trips the global ending flag.
pub struct ModuleSource {
    core: Arc<SchedulerCore>,
    worker_id: usize,
    in_flight: Option<InstanceId>,
}

impl ModuleSource {
    pub(crate) fn new(core: Arc<SchedulerCore>, worker_id: usize) -> Self {
        Self {
            core,
            worker_id,
            in_flight: None,
        }
    }

    /// Record completion of the previously returned module (if any) and
    /// dequeue the next module assigned to this worker.
    pub fn next(&mut self) -> Option<ScheduledModule> {
        if let Some(previous) = self.in_flight.take() {
            self.core.complete(previous);
        }
        let module = self.core.dequeue(self.worker_id);
        self.in_flight = module.as_ref().map(|m| m.id);
        if module.is_none() {
            debug!(worker_id = self.worker_id, "Module source exhausted");
        }
        module
    }

    /// The worker this source feeds (1-based)
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use std::time::Duration;

    #[test]
    fn next_completes_the_previous_module() {
        let mut builder = GraphBuilder::new();
        builder.start_module("init").unwrap();
        builder.start_module("after").unwrap();
        let graph = builder.complete().unwrap();

        let core = Arc::new(SchedulerCore::new(&graph, 1, Duration::from_millis(10)));
        let mut source = ModuleSource::new(Arc::clone(&core), 1);

        // "after" depends on init implicitly; the second next() both
        // completes init and unblocks it.
        assert_eq!(&*source.next().unwrap().name, "init");
        assert_eq!(&*source.next().unwrap().name, "after");
        assert!(source.next().is_none());
        assert_eq!(core.completed(), 2);
    }
}
