//! Module definitions and placement affinity.

use std::collections::BTreeSet;

/// Placement constraint for a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// May run on any single worker
    Any,
    /// Must run once per worker; expanded into one clone per worker id at
    /// scheduling time, all clones joining on the same provided subjects
    All,
    /// Pinned to a specific worker id (1-based)
    Worker(usize),
}

/// A named unit of schedulable work with declared provided/required
/// subjects and an opaque script payload.
///
/// Definitions are accumulated by [`GraphBuilder`](crate::graph::GraphBuilder)
/// and frozen into a [`ModuleGraph`](crate::graph::ModuleGraph); they are
/// never mutated after freezing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDefinition {
    /// Module identity; also always a member of `provides`
    pub name: String,

    /// Subject names this module satisfies on completion
    pub provides: BTreeSet<String>,

    /// Subject names that must be satisfied before this module may run.
    /// Every module except one named `init` starts with an implicit
    /// requirement on `init`.
    pub requires: BTreeSet<String>,

    /// Opaque script payload handed unmodified to the external host
    pub script: String,

    /// Placement constraint
    pub affinity: Affinity,
}

impl ModuleDefinition {
    pub(crate) fn new(name: String) -> Self {
        let mut provides = BTreeSet::new();
        provides.insert(name.clone());

        // Everything except the init module itself waits on init by
        // default; providing "init" removes the seed.
        let mut requires = BTreeSet::new();
        if name != "init" {
            requires.insert("init".to_string());
        }

        Self {
            name,
            provides,
            requires,
            script: String::new(),
            affinity: Affinity::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_module_provides_its_own_name() {
        let module = ModuleDefinition::new("deploy_schema".to_string());
        assert!(module.provides.contains("deploy_schema"));
        assert_eq!(module.affinity, Affinity::Any);
    }

    #[test]
    fn new_module_implicitly_requires_init() {
        let module = ModuleDefinition::new("deploy_schema".to_string());
        assert!(module.requires.contains("init"));
    }

    #[test]
    fn init_module_does_not_require_itself() {
        let module = ModuleDefinition::new("init".to_string());
        assert!(module.requires.is_empty());
        assert!(module.provides.contains("init"));
    }
}
