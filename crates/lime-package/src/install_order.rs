//! Install order computation for package dependencies

use crate::{PackageError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Install order computer using topological sort
///
/// Edges point from a package to the packages it needs installed first.
/// Edges to names outside the graph are ignored.
#[derive(Debug, Clone, Default)]
pub struct InstallOrderComputer {
    /// Dependency graph: package -> dependencies
    graph: BTreeMap<String, BTreeSet<String>>,
}

impl InstallOrderComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a raw dependency graph
    pub fn from_graph<I, D>(graph: I) -> Self
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let mut computer = Self::new();
        for (package, deps) in graph {
            computer.add_package(package.clone());
            for dep in deps {
                computer.add_dependency(package.clone(), dep);
            }
        }
        computer
    }

    pub fn add_package(&mut self, package: impl Into<String>) {
        self.graph.entry(package.into()).or_default();
    }

    /// `package` must be installed after `dependency`
    pub fn add_dependency(&mut self, package: impl Into<String>, dependency: impl Into<String>) {
        self.graph
            .entry(package.into())
            .or_default()
            .insert(dependency.into());
    }

    /// Compute install order using Kahn's algorithm, dependencies first
    ///
    /// Ties are broken by name so the order is stable.
    pub fn compute(&self) -> Result<Vec<String>> {
        Ok(self.install_groups()?.into_iter().flatten().collect())
    }

    /// Groups that could be installed in parallel, in order
    pub fn install_groups(&self) -> Result<Vec<Vec<String>>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .graph
            .iter()
            .map(|(package, deps)| (package.as_str(), self.known(deps).count()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (package, deps) in &self.graph {
            for dep in self.known(deps) {
                dependents.entry(dep).or_default().push(package);
            }
        }

        let mut groups = Vec::new();
        let mut ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(package, _)| *package)
            .collect();

        while !ready.is_empty() {
            for package in &ready {
                remaining.remove(package);
            }

            let mut next = BTreeSet::new();
            for package in &ready {
                for dependent in dependents.get(package).into_iter().flatten() {
                    if let Some(degree) = remaining.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(*dependent);
                        }
                    }
                }
            }

            groups.push(ready.iter().map(|p| p.to_string()).collect());
            ready = next.into_iter().collect();
        }

        if !remaining.is_empty() {
            let cycle: Vec<&str> = remaining.keys().copied().collect();
            return Err(PackageError::CyclicDependency(cycle.join(", ")));
        }

        Ok(groups)
    }

    /// Reverse install order: dependents before their dependencies
    pub fn removal_order(&self) -> Result<Vec<String>> {
        let mut order = self.compute()?;
        order.reverse();
        Ok(order)
    }

    fn known<'a>(&'a self, deps: &'a BTreeSet<String>) -> impl Iterator<Item = &'a str> + 'a {
        deps.iter()
            .map(String::as_str)
            .filter(|dep| self.graph.contains_key(*dep))
    }

    /// Get dependencies for a specific package
    pub fn dependencies(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.graph.get(package)
    }

    /// All packages in the graph, sorted
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.graph.keys().map(String::as_str)
    }

    pub fn package_count(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}
