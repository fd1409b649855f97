//! Breaks/Conflicts detection

use crate::manifest::{Dependency, Manifest};
use crate::{PackageError, Result};
use std::collections::BTreeMap;

/// Checks negative relationships between a batch and the package pool
pub struct ConflictChecker<'p> {
    pool: &'p BTreeMap<String, Manifest>,
}

impl<'p> ConflictChecker<'p> {
    pub fn new(pool: &'p BTreeMap<String, Manifest>) -> Self {
        Self { pool }
    }

    /// Fail on the first conflict found, in either direction
    pub fn check(&self, batch: &[Manifest]) -> Result<()> {
        for manifest in batch {
            // Incoming package breaks or conflicts with something in the pool
            for dep in manifest.dependencies.iter().filter(|d| d.relationship.is_negative()) {
                if let Some(other) = self.matching(dep, manifest) {
                    return Err(conflict(manifest, other, dep));
                }
            }

            // Something in the pool breaks or conflicts with the incoming package
            for other in self.pool.values() {
                if other.name == manifest.name {
                    continue;
                }
                let hit = other
                    .dependencies
                    .iter()
                    .find(|d| d.relationship.is_negative() && manifest.satisfies(d));
                if let Some(dep) = hit {
                    return Err(conflict(other, manifest, dep));
                }
            }
        }

        Ok(())
    }

    fn matching(&self, dep: &Dependency, owner: &Manifest) -> Option<&'p Manifest> {
        self.pool
            .values()
            .find(|other| other.name != owner.name && other.satisfies(dep))
    }
}

fn conflict(package: &Manifest, other: &Manifest, dep: &Dependency) -> PackageError {
    PackageError::DependencyConflict {
        package: package.name.to_string(),
        other: other.name.to_string(),
        relation: format!("{} {}", dep.relationship, dep.requirement()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{PackageName, Relationship, Required};
    use crate::version::Version;

    fn manifest(name: &str) -> Manifest {
        Manifest::new(PackageName::new(name).unwrap(), Version::new(1, 0, 0))
    }

    fn negative(name: &str, relationship: Relationship) -> Dependency {
        Dependency::new(
            PackageName::new(name).unwrap(),
            relationship,
            Required::GREATER_THAN_EQUAL,
            Version::new(1, 0, 0),
        )
    }

    fn pool(manifests: &[Manifest]) -> BTreeMap<String, Manifest> {
        manifests
            .iter()
            .map(|m| (m.name.to_string(), m.clone()))
            .collect()
    }

    #[test]
    fn test_incoming_conflicts_with_installed() {
        let incoming = manifest("new").with_dependency(negative("old", Relationship::Conflicts));
        let pool = pool(&[manifest("old"), incoming.clone()]);

        let err = ConflictChecker::new(&pool).check(&[incoming]).unwrap_err();
        assert!(matches!(
            err,
            PackageError::DependencyConflict { ref package, ref other, .. }
                if package == "new" && other == "old"
        ));
    }

    #[test]
    fn test_installed_breaks_incoming() {
        let incoming = manifest("new");
        let pool = pool(&[
            manifest("old").with_dependency(negative("new", Relationship::Breaks)),
            incoming.clone(),
        ]);

        let err = ConflictChecker::new(&pool).check(&[incoming]).unwrap_err();
        assert!(matches!(
            err,
            PackageError::DependencyConflict { ref package, .. } if package == "old"
        ));
    }

    #[test]
    fn test_conflict_through_provided_identity() {
        let incoming = manifest("new").with_dependency(negative("mta", Relationship::Conflicts));
        let pool = pool(&[
            manifest("postfix").with_dependency(Dependency::new(
                PackageName::new("mta").unwrap(),
                Relationship::Provides,
                Required::EQUAL,
                Version::new(1, 0, 0),
            )),
            incoming.clone(),
        ]);

        assert!(ConflictChecker::new(&pool).check(&[incoming]).is_err());
    }

    #[test]
    fn test_no_conflict_when_version_outside_range() {
        let incoming = manifest("new").with_dependency(Dependency::new(
            PackageName::new("old").unwrap(),
            Relationship::Conflicts,
            Required::LESS_THAN,
            Version::new(1, 0, 0),
        ));
        let pool = pool(&[manifest("old"), incoming.clone()]);

        assert!(ConflictChecker::new(&pool).check(&[incoming]).is_ok());
    }
}
