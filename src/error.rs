//! # Scheduler Error Types
//!
//! Structured error handling for graph construction and scheduling using
//! thiserror for typed errors instead of `Box<dyn Error>` patterns.
//!
//! Configuration and builder-misuse errors are fatal and surface
//! synchronously from the graph builder. Payload execution errors are a
//! per-worker concern: they are caught by the worker pool driver, logged
//! with the worker id, and recorded in the run report rather than
//! propagated through this taxonomy.

use thiserror::Error;

/// Errors raised by the graph builder and the worker pool driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// One or more required subjects have no provider. Raised by
    /// `GraphBuilder::complete()` before any work starts; never retried.
    #[error("configuration error: no provider found for required subject(s): {}", subjects.join(", "))]
    MissingProviders { subjects: Vec<String> },

    /// Programming-error-class misuse of the builder: mutating the graph
    /// after freezing, empty module names, and similar.
    #[error("graph builder misuse: {reason}")]
    BuilderMisuse { reason: String },

    /// A module is pinned to a worker id that does not exist at the
    /// resolved parallelism. Raised by the driver before any worker is
    /// spawned; the run would otherwise park forever behind an
    /// unservable queue head.
    #[error("configuration error: module '{module}' is pinned to worker {worker_id} but parallelism is {parallelism}")]
    PinnedWorkerOutOfRange {
        module: String,
        worker_id: usize,
        parallelism: usize,
    },

    /// A payload executor panicked; the panic was caught at the worker boundary.
    #[error("worker {worker_id} panicked while executing its payload")]
    WorkerPanic { worker_id: usize },
}

impl SchedulerError {
    /// Create a missing-providers configuration error. Subject names are
    /// sorted and deduplicated so the message is stable.
    pub fn missing_providers(mut subjects: Vec<String>) -> Self {
        subjects.sort();
        subjects.dedup();
        Self::MissingProviders { subjects }
    }

    /// Create a builder misuse error
    pub fn builder_misuse(reason: impl Into<String>) -> Self {
        Self::BuilderMisuse {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
