#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # modsched
//!
//! Module dependency scheduler for database tooling workloads: accepts a
//! set of named, interdependent units of work ("modules"), each optionally
//! restricted to run on a specific worker or on every worker, and executes
//! them across a fixed-size pool of concurrent OS-thread workers in an
//! order that respects declared dependencies.
//!
//! ## Architecture
//!
//! A [`graph::GraphBuilder`] accumulates module definitions (name,
//! provided subjects, required subjects, opaque script payload, worker
//! affinity) and freezes them into an immutable [`graph::ModuleGraph`],
//! validating that every required subject has a provider. The
//! [`scheduler::WorkerPoolDriver`] instantiates a run of the graph,
//! expanding all-workers modules into one clone per worker id (the clones
//! join as a barrier on the subjects they provide), and hands each worker's
//! [`scheduler::ModuleSource`] to an external [`scheduler::PayloadExecutor`]
//! that interprets the opaque payloads.
//!
//! The scheduler core serializes all shared state behind a single mutex
//! with a condition variable for blocked waits; the ready queue is strictly
//! FIFO across workers.
//!
//! ## Module Organization
//!
//! - [`graph`] - Module definitions, incremental builder, frozen graph
//! - [`scheduler`] - Scheduler core, per-worker module source, worker pool driver
//! - [`config`] - Runtime configuration with environment overrides
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured tracing setup and operation log helpers
//!
//! ## Quick Start
//!
//! ```rust
//! use modsched::{GraphBuilder, SchedulerConfig, WorkerContext, WorkerPoolDriver};
//! use std::collections::HashMap;
//!
//! # fn example() -> modsched::Result<()> {
//! let mut builder = GraphBuilder::new();
//! builder.start_module("init")?;
//! builder.append_payload("CREATE SCHEMA deploy")?;
//!
//! builder.start_module("configure_session")?;
//! builder.set_all_workers_affinity()?;
//! builder.append_payload("SET LOCK_TIMEOUT 5000")?;
//!
//! builder.start_module("load_reference_data")?;
//! builder.add_requires(["configure_session"])?;
//! builder.append_payload("BULK INSERT ...")?;
//!
//! let graph = builder.complete()?;
//!
//! let driver = WorkerPoolDriver::new(graph, SchedulerConfig::default());
//! let executor = |mut ctx: WorkerContext| -> anyhow::Result<()> {
//!     while let Some(module) = ctx.source.next() {
//!         // Hand module.script to the scripting host here, tagging
//!         // output with ctx.worker_id.
//!         let _ = (&module.script, ctx.worker_id);
//!     }
//!     Ok(())
//! };
//! let report = driver.run(HashMap::new(), &executor)?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use graph::{Affinity, GraphBuilder, ModuleDefinition, ModuleGraph};
pub use scheduler::{
    InstanceId, ModuleSource, PayloadExecutor, RunReport, ScheduledModule, SchedulerCore,
    WorkerContext, WorkerFailure, WorkerPoolDriver,
};
