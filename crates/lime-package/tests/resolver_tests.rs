//! Dependency resolution tests against an installed package set

use lime_package::{
    Dependency, Manifest, PackageError, PackageName, Relationship, Required, Resolver, Version,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn pkg(name: &str, major: u64) -> Manifest {
    Manifest::new(PackageName::new(name).unwrap(), Version::new(major, 0, 0))
}

fn rel(name: &str, relationship: Relationship, requires: Required, major: u64) -> Dependency {
    Dependency::new(
        PackageName::new(name).unwrap(),
        relationship,
        requires,
        Version::new(major, 0, 0),
    )
}

fn depends(name: &str, major: u64) -> Dependency {
    rel(name, Relationship::Depends, Required::GREATER_THAN_EQUAL, major)
}

#[rstest]
#[case::satisfied(1, true)]
#[case::too_new_required(2, false)]
fn test_depends_against_installed_version(#[case] wanted: u64, #[case] resolves: bool) {
    let installed = vec![pkg("b", 1)];
    let a = pkg("a", 1).with_dependency(depends("b", wanted));

    let result = Resolver::new(&installed).resolve(&a);
    if resolves {
        assert_eq!(result.unwrap().order, vec!["a".to_string()]);
    } else {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            PackageError::UnresolvedDependency { ref package, ref dependency, ref requirement }
                if package == "a" && dependency == "b" && requirement == ">= v2.0.0"
        ));
    }
}

#[test]
fn test_missing_dependency() {
    let installed: Vec<Manifest> = Vec::new();
    let a = pkg("a", 1).with_dependency(depends("b", 1));
    assert!(matches!(
        Resolver::new(&installed).resolve(&a),
        Err(PackageError::UnresolvedDependency { .. })
    ));
}

#[test]
fn test_batch_installs_dependencies_first() {
    let installed: Vec<Manifest> = Vec::new();
    let batch = vec![
        pkg("web", 1).with_dependency(depends("lib", 1)),
        pkg("lib", 1).with_dependency(depends("base", 1)),
        pkg("base", 1),
    ];

    let resolution = Resolver::new(&installed).resolve_batch(&batch).unwrap();
    assert_eq!(resolution.order, vec!["base", "lib", "web"]);
}

#[test]
fn test_cycle_in_batch_is_rejected() {
    let installed: Vec<Manifest> = Vec::new();
    let batch = vec![
        pkg("a", 1).with_dependency(depends("b", 1)),
        pkg("b", 1).with_dependency(depends("a", 1)),
    ];

    let err = Resolver::new(&installed).resolve_batch(&batch).unwrap_err();
    assert!(matches!(err, PackageError::CyclicDependency(ref names) if names == "a, b"));
}

#[test]
fn test_predepends_recorded() {
    let installed = vec![pkg("base", 1)];
    let a = pkg("a", 1).with_dependency(rel(
        "base",
        Relationship::Predepends,
        Required::GREATER_THAN_EQUAL,
        1,
    ));

    let resolution = Resolver::new(&installed).resolve(&a).unwrap();
    assert_eq!(resolution.predepends_of("a").collect::<Vec<_>>(), vec!["base"]);
}

#[test]
fn test_provides_satisfies_virtual_dependency() {
    let installed = vec![pkg("postfix", 3).with_dependency(rel(
        "mail-transport",
        Relationship::Provides,
        Required::EQUAL,
        1,
    ))];
    let mailer = pkg("mailer", 1).with_dependency(depends("mail-transport", 1));

    assert!(Resolver::new(&installed).resolve(&mailer).is_ok());
}

#[test]
fn test_conflicts_with_installed_package() {
    let installed = vec![pkg("sendmail", 8)];
    let postfix = pkg("postfix", 3).with_dependency(rel(
        "sendmail",
        Relationship::Conflicts,
        Required::GREATER_THAN_EQUAL,
        1,
    ));

    assert!(matches!(
        Resolver::new(&installed).resolve(&postfix),
        Err(PackageError::DependencyConflict { ref package, ref other, .. })
            if package == "postfix" && other == "sendmail"
    ));
}

#[test]
fn test_breaks_only_matching_versions() {
    let installed = vec![pkg("plugin", 1)];
    let host = pkg("host", 2).with_dependency(rel(
        "plugin",
        Relationship::Breaks,
        Required::LESS_THAN,
        1,
    ));

    assert!(Resolver::new(&installed).resolve(&host).is_ok());
}

#[test]
fn test_advisory_dependencies_become_diagnostics() {
    let installed: Vec<Manifest> = Vec::new();
    let a = pkg("a", 1)
        .with_dependency(rel("docs", Relationship::Suggests, Required::GREATER_THAN_EQUAL, 1))
        .with_dependency(rel("extras", Relationship::Recommends, Required::GREATER_THAN_EQUAL, 1));

    let resolution = Resolver::new(&installed).resolve(&a).unwrap();
    let missing: Vec<&str> = resolution
        .diagnostics
        .iter()
        .map(|d| d.dependency.as_str())
        .collect();
    assert_eq!(missing, vec!["docs", "extras"]);
}

#[test]
fn test_upgrade_breaking_dependent() {
    let installed = vec![pkg("lib", 1), pkg("app", 1).with_dependency(rel(
        "lib",
        Relationship::Depends,
        Required::LESS_THAN,
        2,
    ))];

    let err = Resolver::new(&installed).check_upgrade(&pkg("lib", 2)).unwrap_err();
    assert!(matches!(
        err,
        PackageError::BreakingUpgrade { ref package, ref dependent, .. }
            if package == "lib" && dependent == "app"
    ));
    assert!(Resolver::new(&installed).check_upgrade(&pkg("lib", 1)).is_ok());
}

#[test]
fn test_removal_blocked_by_dependent_outside_batch() {
    let installed = vec![
        pkg("lib", 1),
        pkg("app", 1).with_dependency(depends("lib", 1)),
    ];
    let resolver = Resolver::new(&installed);

    assert!(matches!(
        resolver.check_removal(&["lib"]),
        Err(PackageError::DependentPackagesExist { ref package, ref dependents })
            if package == "lib" && dependents == &vec!["app".to_string()]
    ));
    assert!(resolver.check_removal(&["lib", "app"]).is_ok());
    assert!(resolver.check_removal(&["app"]).is_ok());
}
