//! Dependency edges between the managed objects bound in one scope.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// Declared dependencies of every managed object bound in a scope.
///
/// A name is recorded once, together with all of its dependencies, and a
/// binding whose dependencies already reach it is refused. The graph is
/// therefore acyclic at all times.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// bound name -> what it depends on
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` and the names it depends on.
    ///
    /// Dependencies need not be recorded yet.
    ///
    /// # Errors
    /// `CircularDependency` if a dependency already leads back to `name`,
    /// `Configuration` if `name` is already recorded. Nothing is recorded
    /// on error.
    pub fn bind(&mut self, name: &str, dependencies: &[String]) -> Result<()> {
        if self.edges.contains_key(name) {
            return Err(Error::configuration(format!(
                "'{name}' is already in the dependency graph"
            )));
        }
        for dependency in dependencies {
            if let Some(path) = self.path(dependency, name) {
                let mut cycle = vec![name];
                cycle.extend(path);
                return Err(Error::CircularDependency {
                    cycle: cycle.join(" -> "),
                });
            }
        }
        self.edges.insert(name.to_string(), dependencies.to_vec());
        Ok(())
    }

    /// What `name` depends on. Empty for unrecorded names.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether `name` has been recorded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Recorded names, each one ahead of everything it depends on.
    ///
    /// Unrecorded dependencies are left out. Ties are broken by name so the
    /// order is stable.
    #[must_use]
    pub fn teardown_order(&self) -> Vec<String> {
        let mut finished = Vec::with_capacity(self.edges.len());
        let mut visited = BTreeSet::new();
        for name in self.edges.keys() {
            self.finish(name, &mut visited, &mut finished);
        }
        finished.reverse();
        finished
    }

    // Post-order: dependencies land before their dependents.
    fn finish<'a>(
        &'a self,
        name: &'a str,
        visited: &mut BTreeSet<&'a str>,
        finished: &mut Vec<String>,
    ) {
        if !visited.insert(name) {
            return;
        }
        for dependency in self.dependencies(name) {
            self.finish(dependency, visited, finished);
        }
        if self.contains(name) {
            finished.push(name.to_string());
        }
    }

    /// Names along dependency edges from `from` to `to`, both included.
    fn path<'a>(&'a self, from: &'a str, to: &'a str) -> Option<Vec<&'a str>> {
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        let mut seen = BTreeSet::from([from]);
        let mut pending = vec![from];

        while let Some(node) = pending.pop() {
            if node == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&previous) = parent.get(cursor) {
                    path.push(previous);
                    cursor = previous;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.dependencies(node) {
                if seen.insert(next.as_str()) {
                    parent.insert(next.as_str(), node);
                    pending.push(next.as_str());
                }
            }
        }
        None
    }
}
