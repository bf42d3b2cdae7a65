//! # Scheduler Core
//!
//! Thread-safe dequeue/complete protocol over a FIFO ready queue and a
//! subject index, serialized by a single mutex with a condition variable
//! for blocked waits.
//!
//! ## Readiness model
//!
//! Each scheduled instance carries a count of outstanding required
//! subjects; each subject tracks how many of its providers have not yet
//! completed and which instances are waiting on it. All-workers modules
//! expand into one instance per worker id at construction, every clone
//! counting against the same subject entries. A subject is satisfied only
//! when its provider count drains to zero, which is what gives all-workers
//! modules barrier join semantics.
//!
//! ## Queue discipline
//!
//! The ready queue is strictly FIFO across all workers. A worker whose id
//! is not permitted by the queue head does not skip ahead; it parks on the
//! condition variable with a bounded timeout and re-checks, so a pinned or
//! per-worker head blocks that worker until the head is served or a
//! completion reshapes the queue.

use crate::graph::module::Affinity;
use crate::graph::ModuleGraph;
use crate::logging::log_module_operation;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque identity of a scheduled module instance within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub(crate) usize);

/// A dequeued module instance handed to the external host
#[derive(Debug, Clone)]
pub struct ScheduledModule {
    /// Instance identity, used to record completion
    pub id: InstanceId,
    /// Defining module name (clones of an all-workers module share it)
    pub name: Arc<str>,
    /// Opaque script payload, shared across clones
    pub script: Arc<str>,
    /// Worker the instance is bound to; `None` for any-affinity modules
    pub worker_slot: Option<usize>,
}

/// Per-instance scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Ready,
    Running,
    Completed,
}

struct Instance {
    name: Arc<str>,
    script: Arc<str>,
    /// Subjects this instance contributes to, shared across clones
    provides: Arc<[String]>,
    worker_slot: Option<usize>,
    /// Required subjects not yet satisfied
    outstanding: usize,
    phase: Phase,
}

#[derive(Debug, Default)]
struct SubjectEntry {
    /// Providers (including every all-workers clone) not yet completed
    providers_remaining: usize,
    /// Instances waiting on this subject
    required_by: Vec<usize>,
}

struct CoreState {
    instances: Vec<Instance>,
    /// Subject name -> outstanding providers and waiting instances.
    /// An entry exists only while at least one provider is outstanding.
    subjects: HashMap<String, SubjectEntry>,
    ready: VecDeque<usize>,
    ending: bool,
    dispatched: usize,
    completed: usize,
}

/// Mutex-protected scheduler owning the ready queue and subject index
pub struct SchedulerCore {
    state: Mutex<CoreState>,
    wakeup: Condvar,
    poll: Duration,
    parallelism: usize,
}

impl SchedulerCore {
    /// Instantiate a run of the frozen graph for a concrete worker count.
    ///
    /// All-workers modules are expanded here into one clone per worker id
    /// `1..=parallelism`; clones share the same name, script, and provides
    /// set, so they join on the same subject entries.
    pub fn new(graph: &ModuleGraph, parallelism: usize, poll: Duration) -> Self {
        let mut instances = Vec::new();
        let mut definition_of = Vec::new();

        for (def_idx, definition) in graph.definitions().iter().enumerate() {
            let name: Arc<str> = Arc::from(definition.name.as_str());
            let script: Arc<str> = Arc::from(definition.script.as_str());
            let provides: Arc<[String]> =
                definition.provides.iter().cloned().collect::<Vec<_>>().into();

            let slots: Vec<Option<usize>> = match definition.affinity {
                Affinity::Any => vec![None],
                Affinity::Worker(id) => vec![Some(id)],
                Affinity::All => (1..=parallelism).map(Some).collect(),
            };

            for worker_slot in slots {
                definition_of.push(def_idx);
                instances.push(Instance {
                    name: Arc::clone(&name),
                    script: Arc::clone(&script),
                    provides: Arc::clone(&provides),
                    worker_slot,
                    outstanding: 0,
                    phase: Phase::Pending,
                });
            }
        }

        // First pass: count outstanding providers per subject.
        let mut subjects: HashMap<String, SubjectEntry> = HashMap::new();
        for instance in &instances {
            for subject in instance.provides.iter() {
                subjects.entry(subject.clone()).or_default().providers_remaining += 1;
            }
        }

        // Second pass: register requirements. The graph was validated at
        // freeze time, so every required subject has an entry.
        for (idx, &def_idx) in definition_of.iter().enumerate() {
            for subject in &graph.definitions()[def_idx].requires {
                if let Some(entry) = subjects.get_mut(subject) {
                    entry.required_by.push(idx);
                    instances[idx].outstanding += 1;
                }
            }
        }

        // Seed the ready queue in definition order (clones in worker order).
        let mut ready = VecDeque::new();
        for (idx, instance) in instances.iter_mut().enumerate() {
            if instance.outstanding == 0 {
                instance.phase = Phase::Ready;
                ready.push_back(idx);
            }
        }

        debug!(
            instance_count = instances.len(),
            subject_count = subjects.len(),
            initially_ready = ready.len(),
            parallelism = parallelism,
            "Scheduler core initialized"
        );

        Self {
            state: Mutex::new(CoreState {
                instances,
                subjects,
                ready,
                ending: false,
                dispatched: 0,
                completed: 0,
            }),
            wakeup: Condvar::new(),
            poll,
            parallelism,
        }
    }

    /// Return the next module instance assigned to `worker_id`, or `None`
    /// when the ending flag is set or all work is done.
    ///
    /// Strict FIFO: only the queue head is ever considered. A head the
    /// caller may not run parks the caller on the condition variable with
    /// a bounded timeout until the head is served by its worker.
    pub fn dequeue(&self, worker_id: usize) -> Option<ScheduledModule> {
        let mut state = self.state.lock();
        loop {
            if state.ending {
                debug!(worker_id = worker_id, "Dequeue refused: run is ending");
                return None;
            }

            if let Some(&head) = state.ready.front() {
                let permitted = match state.instances[head].worker_slot {
                    None => true,
                    Some(slot) => slot == worker_id,
                };
                if permitted {
                    state.ready.pop_front();
                    state.dispatched += 1;
                    let instance = &mut state.instances[head];
                    instance.phase = Phase::Running;
                    log_module_operation(
                        "dispatch",
                        &instance.name,
                        Some(worker_id),
                        "running",
                        None,
                    );
                    return Some(ScheduledModule {
                        id: InstanceId(head),
                        name: Arc::clone(&instance.name),
                        script: Arc::clone(&instance.script),
                        worker_slot: instance.worker_slot,
                    });
                }
                // Head belongs to another worker; wait rather than skip.
                let _ = self.wakeup.wait_for(&mut state, self.poll);
                continue;
            }

            if state.subjects.is_empty() {
                debug!(worker_id = worker_id, "Dequeue exhausted: all work done");
                return None;
            }

            let _ = self.wakeup.wait_for(&mut state, self.poll);
        }
    }

    /// Record completion of a dispatched instance and propagate readiness.
    ///
    /// For each subject the instance provides, the outstanding provider
    /// count is decremented; a subject drained to zero is removed from the
    /// index and every waiter's requirement count drops, with instances
    /// reaching zero appended to the ready queue exactly once.
    pub fn complete(&self, id: InstanceId) {
        let mut state = self.state.lock();

        if state.instances[id.0].phase == Phase::Completed {
            warn!(
                module_name = %state.instances[id.0].name,
                "Completion recorded twice for the same instance; ignoring"
            );
            return;
        }
        state.instances[id.0].phase = Phase::Completed;
        state.completed += 1;

        let name = Arc::clone(&state.instances[id.0].name);
        let worker_slot = state.instances[id.0].worker_slot;
        log_module_operation("complete", &name, worker_slot, "completed", None);

        let provides = Arc::clone(&state.instances[id.0].provides);
        let mut newly_ready = false;

        for subject in provides.iter() {
            let drained = match state.subjects.get_mut(subject) {
                Some(entry) => {
                    entry.providers_remaining -= 1;
                    entry.providers_remaining == 0
                }
                None => false,
            };
            if !drained {
                continue;
            }

            let entry = state
                .subjects
                .remove(subject)
                .expect("drained subject is present");
            debug!(subject = %subject, "Subject satisfied");
            for idx in entry.required_by {
                let instance = &mut state.instances[idx];
                instance.outstanding -= 1;
                if instance.outstanding == 0 {
                    instance.phase = Phase::Ready;
                    state.ready.push_back(idx);
                    newly_ready = true;
                }
            }
        }

        if newly_ready || state.subjects.is_empty() {
            self.wakeup.notify_all();
        }
    }

    /// Set the ending flag, halting dequeue for every worker.
    ///
    /// This is the single place the global-ending policy lives: the driver
    /// calls it whenever any worker's loop ends, normally or by error.
    pub fn request_shutdown(&self) {
        let mut state = self.state.lock();
        if !state.ending {
            state.ending = true;
            debug!("Shutdown requested; further dequeues will return no work");
        }
        drop(state);
        self.wakeup.notify_all();
    }

    /// Number of module instances in this run (after all-workers expansion)
    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Instances handed to workers so far
    pub fn dispatched(&self) -> usize {
        self.state.lock().dispatched
    }

    /// Instances whose completion has been recorded
    pub fn completed(&self) -> usize {
        self.state.lock().completed
    }

    /// Worker count this run was instantiated for
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    #[cfg(test)]
    fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use std::sync::mpsc;
    use std::thread;

    const POLL: Duration = Duration::from_millis(10);

    fn graph_with(defs: &[(&str, &[&str])]) -> ModuleGraph {
        let mut builder = GraphBuilder::new();
        for (name, requires) in defs {
            builder.start_module(*name).unwrap();
            builder.add_requires(requires.iter().copied()).unwrap();
        }
        builder.complete().unwrap()
    }

    #[test]
    fn all_affinity_expands_to_one_clone_per_worker() {
        let mut builder = GraphBuilder::new();
        builder.start_module("init").unwrap();
        builder.start_module("configure").unwrap();
        builder.set_all_workers_affinity().unwrap();
        let graph = builder.complete().unwrap();

        let core = SchedulerCore::new(&graph, 3, POLL);
        assert_eq!(core.instance_count(), 4);

        let init = core.dequeue(1).unwrap();
        assert_eq!(&*init.name, "init");
        core.complete(init.id);

        // Clones come off the queue in worker order 1..=3.
        for worker in 1..=3 {
            let clone = core.dequeue(worker).unwrap();
            assert_eq!(&*clone.name, "configure");
            assert_eq!(clone.worker_slot, Some(worker));
            core.complete(clone.id);
        }
        assert!(core.dequeue(1).is_none());
    }

    #[test]
    fn subject_satisfied_only_after_every_clone_completes() {
        let mut builder = GraphBuilder::new();
        builder.start_module("init").unwrap();
        builder.start_module("setup").unwrap();
        builder.set_all_workers_affinity().unwrap();
        builder.start_module("final").unwrap();
        builder.add_requires(["setup"]).unwrap();
        let graph = builder.complete().unwrap();

        let core = SchedulerCore::new(&graph, 3, POLL);
        let init = core.dequeue(1).unwrap();
        core.complete(init.id);

        let clones: Vec<_> = (1..=3).map(|w| core.dequeue(w).unwrap()).collect();
        core.complete(clones[0].id);
        core.complete(clones[1].id);
        // Two of three clones done: "final" must not be ready yet.
        assert_eq!(core.ready_len(), 0);

        core.complete(clones[2].id);
        let last = core.dequeue(2).unwrap();
        assert_eq!(&*last.name, "final");
        core.complete(last.id);
        assert!(core.dequeue(2).is_none());
    }

    #[test]
    fn dependent_waits_for_provider_completion() {
        let graph = graph_with(&[("init", &[]), ("a", &["init"]), ("b", &["a"])]);
        let core = SchedulerCore::new(&graph, 1, POLL);

        let init = core.dequeue(1).unwrap();
        assert_eq!(&*init.name, "init");
        // "a" is pending until init's completion is recorded.
        assert_eq!(core.ready_len(), 0);
        core.complete(init.id);

        let a = core.dequeue(1).unwrap();
        assert_eq!(&*a.name, "a");
        core.complete(a.id);

        let b = core.dequeue(1).unwrap();
        assert_eq!(&*b.name, "b");
        core.complete(b.id);
        assert!(core.dequeue(1).is_none());
    }

    #[test]
    fn incompatible_head_blocks_worker_until_served() {
        let mut builder = GraphBuilder::new();
        builder.start_module("init").unwrap();
        builder.start_module("pinned").unwrap();
        builder.set_worker_affinity(2).unwrap();
        builder.start_module("floating").unwrap();
        let graph = builder.complete().unwrap();

        let core = Arc::new(SchedulerCore::new(&graph, 2, POLL));
        let init = core.dequeue(1).unwrap();
        core.complete(init.id);

        let (tx, rx) = mpsc::channel();
        let blocked = {
            let core = Arc::clone(&core);
            thread::spawn(move || {
                // Head is pinned to worker 2, so this call must wait even
                // though "floating" sits right behind it.
                let module = core.dequeue(1);
                tx.send(()).unwrap();
                module
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err(), "worker 1 should still be parked");

        let pinned = core.dequeue(2).unwrap();
        assert_eq!(&*pinned.name, "pinned");
        core.complete(pinned.id);

        let floating = blocked.join().unwrap().unwrap();
        assert_eq!(&*floating.name, "floating");
        core.complete(floating.id);
    }

    #[test]
    fn shutdown_halts_dequeue_for_all_workers() {
        let graph = graph_with(&[("init", &[]), ("a", &["init"]), ("b", &["init"])]);
        let core = SchedulerCore::new(&graph, 2, POLL);

        let init = core.dequeue(1).unwrap();
        core.complete(init.id);
        core.request_shutdown();

        assert!(core.dequeue(1).is_none());
        assert!(core.dequeue(2).is_none());
        assert_eq!(core.dispatched(), 1);
    }

    #[test]
    fn completion_is_recorded_once() {
        let graph = graph_with(&[("init", &[])]);
        let core = SchedulerCore::new(&graph, 1, POLL);

        let init = core.dequeue(1).unwrap();
        core.complete(init.id);
        core.complete(init.id);
        assert_eq!(core.completed(), 1);
    }
}
