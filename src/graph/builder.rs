//! # Graph Builder
//!
//! Incremental API that accumulates module definitions and freezes them
//! into an immutable dependency graph. The builder is consumed by a
//! configuration/definition phase (e.g. parsed from a deployment manifest);
//! the frozen [`ModuleGraph`] is what the scheduler runs.
//!
//! ## Usage
//!
//! ```rust
//! use modsched::graph::GraphBuilder;
//!
//! # fn example() -> modsched::Result<()> {
//! let mut builder = GraphBuilder::new();
//! builder.start_module("init")?;
//! builder.append_payload("CREATE TABLE runs (id int)")?;
//!
//! builder.start_module("load_data")?;
//! builder.add_requires(["init"])?;
//! builder.append_payload("BULK INSERT ...")?;
//!
//! let graph = builder.complete()?;
//! assert_eq!(graph.definitions().len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SchedulerError};
use crate::graph::module::{Affinity, ModuleDefinition};
use std::collections::BTreeSet;
use tracing::debug;

/// Incremental builder for the module dependency graph
#[derive(Debug, Default)]
pub struct GraphBuilder {
    definitions: Vec<ModuleDefinition>,
    /// Whether a module definition is currently open
    open: bool,
    frozen: bool,
}

impl GraphBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new module definition, implicitly closing the prior one.
    ///
    /// Fails with a builder-misuse error after [`complete`](Self::complete),
    /// for an empty name, or for a name already defined.
    pub fn start_module(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_mutable("start_module")?;

        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::builder_misuse(
                "module name cannot be empty",
            ));
        }
        if self.definitions.iter().any(|m| m.name == name) {
            return Err(SchedulerError::builder_misuse(format!(
                "module '{name}' is already defined"
            )));
        }

        debug!(module_name = %name, "Starting module definition");
        self.definitions.push(ModuleDefinition::new(name));
        self.open = true;
        Ok(())
    }

    /// Union subject names into the current module's provides set,
    /// removing the same names from its requires set.
    pub fn add_provides<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = self.current_module("add_provides")?;
        for name in names {
            let name = name.into();
            module.requires.remove(&name);
            module.provides.insert(name);
        }
        Ok(())
    }

    /// Union subject names into the current module's requires set,
    /// removing the same names from its provides set.
    pub fn add_requires<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = self.current_module("add_requires")?;
        for name in names {
            let name = name.into();
            module.provides.remove(&name);
            module.requires.insert(name);
        }
        Ok(())
    }

    /// Append an opaque payload fragment to the current module's script
    pub fn append_payload(&mut self, fragment: &str) -> Result<()> {
        let module = self.current_module("append_payload")?;
        module.script.push_str(fragment);
        module.script.push('\n');
        Ok(())
    }

    /// Mark the current module as all-workers: it will run once per worker,
    /// and subjects it provides are satisfied only when every per-worker
    /// clone has completed.
    pub fn set_all_workers_affinity(&mut self) -> Result<()> {
        let module = self.current_module("set_all_workers_affinity")?;
        module.affinity = Affinity::All;
        Ok(())
    }

    /// Pin the current module to a specific worker id (1-based)
    pub fn set_worker_affinity(&mut self, worker_id: usize) -> Result<()> {
        if worker_id == 0 {
            return Err(SchedulerError::builder_misuse(
                "worker ids are 1-based; cannot pin to worker 0",
            ));
        }
        let module = self.current_module("set_worker_affinity")?;
        module.affinity = Affinity::Worker(worker_id);
        Ok(())
    }

    /// Close the last module, validate that every required subject has at
    /// least one provider, and freeze the definitions into an immutable
    /// [`ModuleGraph`].
    ///
    /// On validation failure the error names every missing subject, sorted
    /// and deduplicated. After this call every further definition call on
    /// the builder fails with a builder-misuse error.
    pub fn complete(&mut self) -> Result<ModuleGraph> {
        self.ensure_mutable("complete")?;
        self.open = false;
        self.frozen = true;

        let provided: BTreeSet<&str> = self
            .definitions
            .iter()
            .flat_map(|m| m.provides.iter().map(String::as_str))
            .collect();

        let missing: Vec<String> = self
            .definitions
            .iter()
            .flat_map(|m| m.requires.iter())
            .filter(|subject| !provided.contains(subject.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(SchedulerError::missing_providers(missing));
        }

        let definitions = std::mem::take(&mut self.definitions);
        debug!(
            module_count = definitions.len(),
            "Module graph frozen"
        );
        Ok(ModuleGraph { definitions })
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.frozen {
            return Err(SchedulerError::builder_misuse(format!(
                "{operation} called after the graph was frozen"
            )));
        }
        Ok(())
    }

    fn current_module(&mut self, operation: &str) -> Result<&mut ModuleDefinition> {
        self.ensure_mutable(operation)?;
        if !self.open {
            return Err(SchedulerError::builder_misuse(format!(
                "{operation} called before any start_module"
            )));
        }
        Ok(self
            .definitions
            .last_mut()
            .expect("open definition always has a backing entry"))
    }
}

/// Frozen, validated module dependency graph
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    definitions: Vec<ModuleDefinition>,
}

impl ModuleGraph {
    /// The frozen module definitions, in definition order
    pub fn definitions(&self) -> &[ModuleDefinition] {
        &self.definitions
    }

    /// Whether the graph contains no modules
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
