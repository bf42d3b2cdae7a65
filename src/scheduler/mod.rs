//! Scheduling runtime: the mutex + condvar scheduler core, the per-worker
//! module source handed to the external host, and the worker pool driver.

pub mod core;
pub mod driver;
pub mod source;

pub use self::core::{InstanceId, ScheduledModule, SchedulerCore};
pub use driver::{PayloadExecutor, RunReport, WorkerContext, WorkerFailure, WorkerPoolDriver};
pub use source::ModuleSource;
