//! Dependency resolution against installed packages
//!
//! Resolution never mutates anything: it takes the manifests being installed
//! (the batch), the manifests already installed (from a [`PackageCatalog`]),
//! and either produces an install order or fails before any state changes.

use crate::install_order::InstallOrderComputer;
use crate::manifest::{Dependency, Manifest, Relationship};
use crate::status::StatusDatabase;
use crate::{PackageError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

mod conflict;

pub use conflict::ConflictChecker;

/// Query interface over installed packages
pub trait PackageCatalog {
    /// Manifests of every package in the Installed state
    fn installed(&self) -> Vec<Manifest>;

    /// Installed manifest with exactly this name
    fn lookup(&self, name: &str) -> Option<Manifest> {
        self.installed()
            .into_iter()
            .find(|m| m.name.as_str() == name)
    }

    /// Installed manifests plus those left part way through a transition
    fn present(&self) -> Vec<Manifest> {
        self.installed()
    }
}

impl PackageCatalog for StatusDatabase {
    fn installed(&self) -> Vec<Manifest> {
        StatusDatabase::installed(self)
            .map(|record| record.manifest.clone())
            .collect()
    }

    fn lookup(&self, name: &str) -> Option<Manifest> {
        StatusDatabase::installed(self)
            .find(|record| record.name() == name)
            .map(|record| record.manifest.clone())
    }

    fn present(&self) -> Vec<Manifest> {
        StatusDatabase::present(self)
            .map(|record| record.manifest.clone())
            .collect()
    }
}

impl PackageCatalog for Vec<Manifest> {
    fn installed(&self) -> Vec<Manifest> {
        self.clone()
    }
}

impl PackageCatalog for HashMap<String, Manifest> {
    fn installed(&self) -> Vec<Manifest> {
        let mut manifests: Vec<Manifest> = self.values().cloned().collect();
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        manifests
    }

    fn lookup(&self, name: &str) -> Option<Manifest> {
        self.get(name).cloned()
    }
}

/// An advisory dependency that is not satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub package: String,
    pub dependency: String,
    pub relationship: Relationship,
    pub requirement: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} (not available)",
            self.package, self.relationship, self.dependency, self.requirement
        )
    }
}

/// Outcome of resolving a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Batch members, dependencies first
    pub order: Vec<String>,
    /// (dependent, target) pairs that must be Installed before the
    /// dependent's `before` items run
    pub predepends: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    /// Predepends targets of one package
    pub fn predepends_of<'a>(&'a self, package: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.predepends
            .iter()
            .filter(move |(dependent, _)| dependent == package)
            .map(|(_, target)| target.as_str())
    }
}

/// Dependency resolver over a catalog of installed packages
pub struct Resolver<'a> {
    catalog: &'a dyn PackageCatalog,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn PackageCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve a single manifest
    pub fn resolve(&self, manifest: &Manifest) -> Result<Resolution> {
        self.resolve_batch(std::slice::from_ref(manifest))
    }

    /// Resolve manifests installed together
    pub fn resolve_batch(&self, batch: &[Manifest]) -> Result<Resolution> {
        let mut batch_names = BTreeSet::new();
        for manifest in batch {
            manifest.validate()?;
            if !batch_names.insert(manifest.name.as_str()) {
                return Err(PackageError::InvalidManifest(format!(
                    "'{}' appears twice in one batch",
                    manifest.name
                )));
            }
        }

        let pool = self.pool(batch);
        let mut resolution = Resolution::default();

        for manifest in batch {
            for dep in &manifest.dependencies {
                match dep.relationship {
                    Relationship::Depends | Relationship::Predepends => {
                        let provider = provider_for(&pool, &batch_names, dep).ok_or_else(|| {
                            PackageError::UnresolvedDependency {
                                package: manifest.name.to_string(),
                                dependency: dep.name.to_string(),
                                requirement: dep.requirement(),
                            }
                        })?;
                        if dep.relationship == Relationship::Predepends {
                            resolution
                                .predepends
                                .push((manifest.name.to_string(), provider.to_string()));
                        }
                    }
                    Relationship::Suggests | Relationship::Recommends => {
                        if provider_for(&pool, &batch_names, dep).is_none() {
                            resolution.diagnostics.push(Diagnostic {
                                package: manifest.name.to_string(),
                                dependency: dep.name.to_string(),
                                relationship: dep.relationship,
                                requirement: dep.requirement(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        ConflictChecker::new(&pool).check(batch)?;

        resolution.order = self.order(&pool, &batch_names)?;

        for diagnostic in &resolution.diagnostics {
            tracing::info!(%diagnostic, "advisory dependency not satisfied");
        }
        tracing::debug!(
            order = ?resolution.order,
            predepends = resolution.predepends.len(),
            "resolved batch"
        );

        Ok(resolution)
    }

    /// Installed packages that need `name` through a Depends/Predepends
    /// entry its recorded manifest satisfies
    ///
    /// A package stuck in Installing, Upgrading or Removing still counts as
    /// the target.
    pub fn dependents(&self, name: &str) -> Vec<(Manifest, Dependency)> {
        let Some(target) = self
            .catalog
            .present()
            .into_iter()
            .find(|m| m.name.as_str() == name)
        else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for manifest in self.catalog.installed() {
            if manifest.name == target.name {
                continue;
            }
            let needed: Vec<Dependency> = manifest
                .hard_dependencies()
                .filter(|dep| target.satisfies(dep))
                .cloned()
                .collect();
            for dep in needed {
                found.push((manifest.clone(), dep));
            }
        }
        found
    }

    /// Fail with BreakingUpgrade when replacing the installed version with
    /// `upgrade` would leave an installed dependent unsatisfied
    pub fn check_upgrade(&self, upgrade: &Manifest) -> Result<()> {
        let installed = self.catalog.installed();

        for (dependent, dep) in self.dependents(upgrade.name.as_str()) {
            if upgrade.satisfies(&dep) {
                continue;
            }
            let covered = installed.iter().any(|other| {
                other.name != upgrade.name && other.name != dependent.name && other.satisfies(&dep)
            });
            if !covered {
                return Err(PackageError::BreakingUpgrade {
                    package: upgrade.name.to_string(),
                    dependent: dependent.name.to_string(),
                    reason: format!("{} {} {}", dep.relationship, dep.name, dep.requirement()),
                });
            }
        }

        Ok(())
    }

    /// Fail with DependentPackagesExist when an installed package outside
    /// `names` still needs one of them
    pub fn check_removal(&self, names: &[&str]) -> Result<()> {
        let removing: BTreeSet<&str> = names.iter().copied().collect();
        let present = self.catalog.present();
        let installed = self.catalog.installed();
        let leaving: Vec<&Manifest> = present
            .iter()
            .filter(|m| removing.contains(m.name.as_str()))
            .collect();
        let staying: Vec<&Manifest> = installed
            .iter()
            .filter(|m| !removing.contains(m.name.as_str()))
            .collect();

        let mut blocked: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for dependent in &staying {
            for dep in dependent.hard_dependencies() {
                if staying.iter().any(|other| other.satisfies(dep)) {
                    continue;
                }
                for target in leaving.iter().filter(|target| target.satisfies(dep)) {
                    blocked
                        .entry(target.name.as_str())
                        .or_default()
                        .insert(dependent.name.as_str());
                }
            }
        }

        let first = blocked.into_iter().next();
        match first {
            Some((package, dependents)) => Err(PackageError::DependentPackagesExist {
                package: package.to_string(),
                dependents: dependents.into_iter().map(str::to_string).collect(),
            }),
            None => Ok(()),
        }
    }

    /// Installed packages with batch members replacing same-named ones
    fn pool(&self, batch: &[Manifest]) -> BTreeMap<String, Manifest> {
        let mut pool: BTreeMap<String, Manifest> = self
            .catalog
            .installed()
            .into_iter()
            .map(|m| (m.name.to_string(), m))
            .collect();
        for manifest in batch {
            pool.insert(manifest.name.to_string(), manifest.clone());
        }
        pool
    }

    /// Topological order of the batch over its dependency closure
    fn order(
        &self,
        pool: &BTreeMap<String, Manifest>,
        batch: &BTreeSet<&str>,
    ) -> Result<Vec<String>> {
        let mut computer = InstallOrderComputer::new();
        let mut pending: Vec<&str> = batch.iter().copied().collect();
        let mut visited = BTreeSet::new();

        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            computer.add_package(name);
            let Some(manifest) = pool.get(name) else {
                continue;
            };
            for dep in manifest.hard_dependencies() {
                if let Some(provider) = provider_for(pool, batch, dep) {
                    if provider != name {
                        computer.add_dependency(name, provider);
                        pending.push(provider);
                    }
                }
            }
        }

        let order = computer.compute()?;
        Ok(order
            .into_iter()
            .filter(|name| batch.contains(name.as_str()))
            .collect())
    }
}

/// Name of the pool package satisfying `dep`, preferring batch members and
/// then the exact name
fn provider_for<'p>(
    pool: &'p BTreeMap<String, Manifest>,
    batch: &BTreeSet<&str>,
    dep: &Dependency,
) -> Option<&'p str> {
    let mut candidates: Vec<&Manifest> = pool.values().filter(|m| m.satisfies(dep)).collect();
    candidates.sort_by_key(|m| {
        (
            !batch.contains(m.name.as_str()),
            m.name != dep.name,
            m.name.as_str(),
        )
    });
    candidates.first().map(|m| m.name.as_str())
}
