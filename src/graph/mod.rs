//! Module definition graph: incremental builder, validation, and the
//! frozen dependency graph consumed by the scheduler.

pub mod builder;
pub mod module;

pub use builder::{GraphBuilder, ModuleGraph};
pub use module::{Affinity, ModuleDefinition};
