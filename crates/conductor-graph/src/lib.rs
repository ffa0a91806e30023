//! ---
//! cnd_section: "02-dependency-resolution"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Dependency graph and boot-order resolution."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Directed dependency graph over subsystem names.
//!
//! An edge `A -> B` means "A must reach `Operational` before B begins
//! `initialize`". Registration rejects anything that would close a cycle, and
//! [`DependencyGraph::resolve_order`] produces a total order where ties among
//! independent subsystems break by registration order, keeping boot sequences
//! reproducible across runs with identical registration sequences.

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::debug;

/// Errors raised while registering subsystems or resolving the boot order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A subsystem with this name is already registered.
    #[error("subsystem '{name}' is already registered")]
    DuplicateName {
        /// Offending subsystem name.
        name: String,
    },
    /// A declared dependency was never registered by resolution time.
    #[error("subsystem '{name}' depends on unknown subsystem '{dependency}'")]
    UnknownDependency {
        /// Subsystem declaring the dependency.
        name: String,
        /// The missing dependency name.
        dependency: String,
    },
    /// Registering this subsystem would close a dependency cycle.
    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle {
        /// The cycle, listed in edge order with the first node repeated last.
        chain: Vec<String>,
    },
}

/// Directed acyclic graph encoding required boot ordering among subsystems.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and its dependency edges.
    ///
    /// Dependencies may be forward-declared: an edge to a not-yet-registered
    /// name is legal until [`resolve_order`](Self::resolve_order) runs. A
    /// registration that would close a cycle is rejected whole; no partial
    /// edge set is kept.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        depends_on: impl IntoIterator<Item = String>,
    ) -> Result<(), RegistrationError> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(RegistrationError::DuplicateName { name });
        }
        let deps: IndexSet<String> = depends_on.into_iter().collect();
        self.nodes.insert(name.clone(), deps);

        if let Some(chain) = self.find_cycle_through(&name) {
            self.nodes.shift_remove(&name);
            return Err(RegistrationError::DependencyCycle { chain });
        }
        debug!(subsystem = %name, "registered in dependency graph");
        Ok(())
    }

    /// Whether the graph knows this name.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Declared dependencies of a node, if registered.
    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<String>> {
        self.nodes.get(name)
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Produce a total order consistent with every edge.
    ///
    /// Kahn's algorithm over the registration-ordered node map. Among nodes
    /// whose dependencies are all satisfied, the earliest-registered wins.
    pub fn resolve_order(&self) -> Result<Vec<String>, RegistrationError> {
        for (name, deps) in &self.nodes {
            for dep in deps {
                if !self.nodes.contains_key(dep) {
                    return Err(RegistrationError::UnknownDependency {
                        name: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut emitted: IndexSet<&str> = IndexSet::with_capacity(self.nodes.len());
        let mut order = Vec::with_capacity(self.nodes.len());
        while order.len() < self.nodes.len() {
            let mut advanced = false;
            for (name, deps) in &self.nodes {
                if emitted.contains(name.as_str()) {
                    continue;
                }
                if deps.iter().all(|dep| emitted.contains(dep.as_str())) {
                    emitted.insert(name.as_str());
                    order.push(name.clone());
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                // Unreachable when registration-time cycle checks hold.
                let chain = self
                    .nodes
                    .keys()
                    .filter(|name| !emitted.contains(name.as_str()))
                    .cloned()
                    .collect();
                return Err(RegistrationError::DependencyCycle { chain });
            }
        }
        Ok(order)
    }

    /// Reverse an order for teardown.
    pub fn reverse(order: &[String]) -> Vec<String> {
        order.iter().rev().cloned().collect()
    }

    /// Walk dependency edges looking for a cycle passing through `start`.
    fn find_cycle_through(&self, start: &str) -> Option<Vec<String>> {
        let mut stack = vec![start.to_owned()];
        let mut trail = vec![start.to_owned()];
        self.dfs_cycle(start, start, &mut stack, &mut trail)
    }

    fn dfs_cycle(
        &self,
        origin: &str,
        current: &str,
        stack: &mut Vec<String>,
        trail: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        let deps = self.nodes.get(current)?;
        for dep in deps {
            if dep == origin {
                let mut chain = trail.clone();
                chain.push(origin.to_owned());
                return Some(chain);
            }
            if stack.iter().any(|seen| seen == dep) {
                continue;
            }
            stack.push(dep.clone());
            trail.push(dep.clone());
            if let Some(chain) = self.dfs_cycle(origin, dep, stack, trail) {
                return Some(chain);
            }
            trail.pop();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn resolves_dependencies_before_dependents() {
        let mut graph = DependencyGraph::new();
        graph.register("storage", deps(&[])).unwrap();
        graph.register("index", deps(&["storage"])).unwrap();
        graph.register("api", deps(&["index", "storage"])).unwrap();

        let order = graph.resolve_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("storage") < pos("index"));
        assert!(pos("index") < pos("api"));
    }

    #[test]
    fn ties_break_by_registration_order() {
        let mut graph = DependencyGraph::new();
        graph.register("a", deps(&[])).unwrap();
        graph.register("b", deps(&["a"])).unwrap();
        graph.register("c", deps(&["a"])).unwrap();

        let order = graph.resolve_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);

        let mut swapped = DependencyGraph::new();
        swapped.register("a", deps(&[])).unwrap();
        swapped.register("c", deps(&["a"])).unwrap();
        swapped.register("b", deps(&["a"])).unwrap();
        assert_eq!(swapped.resolve_order().unwrap(), vec!["a", "c", "b"]);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut graph = DependencyGraph::new();
        graph.register("a", deps(&[])).unwrap();
        let err = graph.register("a", deps(&[])).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::DuplicateName {
                name: "a".to_owned()
            }
        );
    }

    #[test]
    fn cycle_rejected_at_registration_without_partial_insert() {
        let mut graph = DependencyGraph::new();
        graph.register("a", deps(&["b"])).unwrap();
        let err = graph.register("b", deps(&["a"])).unwrap_err();
        assert!(matches!(err, RegistrationError::DependencyCycle { .. }));
        assert!(!graph.contains("b"));
        // The surviving forward declaration surfaces at resolution time.
        let err = graph.resolve_order().unwrap_err();
        assert_eq!(
            err,
            RegistrationError::UnknownDependency {
                name: "a".to_owned(),
                dependency: "b".to_owned()
            }
        );
    }

    #[test]
    fn longer_cycle_detected() {
        let mut graph = DependencyGraph::new();
        graph.register("a", deps(&["c"])).unwrap();
        graph.register("b", deps(&["a"])).unwrap();
        let err = graph.register("c", deps(&["b"])).unwrap_err();
        match err {
            RegistrationError::DependencyCycle { chain } => {
                assert_eq!(chain.first(), chain.last());
                assert!(chain.len() >= 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        let err = graph.register("a", deps(&["a"])).unwrap_err();
        assert!(matches!(err, RegistrationError::DependencyCycle { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn reverse_is_verbatim() {
        let order = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        assert_eq!(DependencyGraph::reverse(&order), vec!["c", "b", "a"]);
    }
}
