//! # Worker Pool Driver
//!
//! Launches a fixed number of concurrent OS-thread workers, binds each
//! one's execution context (worker id, run id, shared parameters, module
//! source) and hands it to the external payload executor exactly once.
//! The driving loop lives inside the hosted payload via
//! [`ModuleSource::next`].
//!
//! Any worker ending its loop (by exhausting work normally, by an
//! executor error, or by a caught panic) requests shutdown of the
//! scheduler core, halting dispatch for every other worker. That coupling
//! is deliberate observed behavior and is kept in one place: the worker
//! epilogue below.
//!
//! Cancellation is abrupt: the driver installs no signal handler, so an
//! interactive interrupt terminates the process with no cooperative drain.
//! Callers wanting graceful cancellation can invoke
//! [`SchedulerCore::request_shutdown`] from their own handler.

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::graph::{Affinity, ModuleGraph};
use crate::logging::{log_error, log_worker_operation};
use crate::scheduler::core::SchedulerCore;
use crate::scheduler::source::ModuleSource;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// External scripting host boundary.
///
/// Implementations interpret module payloads however they like; the only
/// contract is that execution is synchronous from the worker's point of
/// view and that the host drives [`ModuleSource::next`] until it returns
/// `None`. Tagging host output with the worker id is the host's concern;
/// the context carries the id for that purpose.
pub trait PayloadExecutor: Sync {
    fn execute(&self, ctx: WorkerContext) -> anyhow::Result<()>;
}

impl<F> PayloadExecutor for F
where
    F: Fn(WorkerContext) -> anyhow::Result<()> + Sync,
{
    fn execute(&self, ctx: WorkerContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Everything a worker's hosted payload is bound with
pub struct WorkerContext {
    /// Worker id, 1-based
    pub worker_id: usize,
    /// Run identifier shared by all workers of one run
    pub run_id: Uuid,
    /// Externally supplied named parameters
    pub parameters: Arc<HashMap<String, serde_json::Value>>,
    /// This worker's module source
    pub source: ModuleSource,
}

/// A payload failure recorded against the worker it happened on
#[derive(Debug, Clone, Serialize)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub message: String,
}

/// Outcome of a scheduling run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub parallelism: usize,
    /// Instances in the run, after all-workers expansion
    pub scheduled_instances: usize,
    /// Instances handed to workers
    pub dispatched: usize,
    /// Instances whose completion was recorded
    pub completed: usize,
    /// Per-worker payload failures; empty on a clean run
    pub worker_failures: Vec<WorkerFailure>,
}

impl RunReport {
    /// Whether every scheduled instance completed with no worker failures
    pub fn is_clean(&self) -> bool {
        self.worker_failures.is_empty() && self.completed == self.scheduled_instances
    }
}

/// Runs a frozen module graph across a fixed pool of worker threads
pub struct WorkerPoolDriver {
    graph: ModuleGraph,
    config: SchedulerConfig,
}

impl WorkerPoolDriver {
    /// Create a driver for a frozen graph
    pub fn new(graph: ModuleGraph, config: SchedulerConfig) -> Self {
        Self { graph, config }
    }

    /// Execute the graph, blocking until all workers finish or the ending
    /// flag trips.
    ///
    /// Spawns one OS thread per resolved parallelism slot; each thread
    /// builds a [`WorkerContext`] and hands it to `executor` once. Payload
    /// errors and panics are caught per worker, logged with the worker id,
    /// and recorded in the returned [`RunReport`]; they are never re-thrown
    /// to other workers, but any worker ending its loop halts dispatch for
    /// everyone.
    pub fn run(
        &self,
        parameters: HashMap<String, serde_json::Value>,
        executor: &dyn PayloadExecutor,
    ) -> Result<RunReport> {
        let parallelism = self.config.resolved_parallelism();

        // A module pinned past the last worker would reach the FIFO head
        // with no worker permitted to take it, parking the whole run.
        for definition in self.graph.definitions() {
            if let Affinity::Worker(worker_id) = definition.affinity {
                if worker_id > parallelism {
                    return Err(SchedulerError::PinnedWorkerOutOfRange {
                        module: definition.name.clone(),
                        worker_id,
                        parallelism,
                    });
                }
            }
        }

        let core = Arc::new(SchedulerCore::new(
            &self.graph,
            parallelism,
            self.config.dequeue_poll(),
        ));
        let run_id = Uuid::new_v4();
        let parameters = Arc::new(parameters);
        let failures: Mutex<Vec<WorkerFailure>> = Mutex::new(Vec::new());

        info!(
            run_id = %run_id,
            parallelism = parallelism,
            scheduled_instances = core.instance_count(),
            "Starting scheduling run"
        );

        std::thread::scope(|scope| {
            for worker_id in 1..=parallelism {
                let core = Arc::clone(&core);
                let parameters = Arc::clone(&parameters);
                let failures = &failures;

                scope.spawn(move || {
                    let run = run_id.to_string();
                    log_worker_operation("worker_start", worker_id, Some(run.as_str()), "running", None);
                    let ctx = WorkerContext {
                        worker_id,
                        run_id,
                        parameters,
                        source: ModuleSource::new(Arc::clone(&core), worker_id),
                    };

                    match catch_unwind(AssertUnwindSafe(|| executor.execute(ctx))) {
                        Ok(Ok(())) => {
                            log_worker_operation(
                                "worker_finish",
                                worker_id,
                                Some(run.as_str()),
                                "success",
                                None,
                            );
                        }
                        Ok(Err(e)) => {
                            let context = format!("worker {worker_id}");
                            log_error("worker_pool", "execute_payload", &e.to_string(), Some(context.as_str()));
                            failures.lock().push(WorkerFailure {
                                worker_id,
                                message: e.to_string(),
                            });
                        }
                        Err(_) => {
                            let panic_error = SchedulerError::WorkerPanic { worker_id };
                            let context = format!("worker {worker_id}");
                            log_error("worker_pool", "execute_payload", &panic_error.to_string(), Some(context.as_str()));
                            failures.lock().push(WorkerFailure {
                                worker_id,
                                message: panic_error.to_string(),
                            });
                        }
                    }

                    // Any worker's loop ending halts scheduling globally.
                    core.request_shutdown();
                });
            }
        });

        let report = RunReport {
            run_id,
            parallelism,
            scheduled_instances: core.instance_count(),
            dispatched: core.dispatched(),
            completed: core.completed(),
            worker_failures: failures.into_inner(),
        };

        info!(
            run_id = %run_id,
            dispatched = report.dispatched,
            completed = report.completed,
            failures = report.worker_failures.len(),
            "Scheduling run finished"
        );

        Ok(report)
    }
}
