//! Package manifest validation

use crate::manifest::{Action, ActionType, Manifest, PackageName};
use crate::PackageError;
use std::collections::HashSet;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid package, dependency or plugin name
    InvalidPackageName(String),
    /// Invalid dependency specification
    InvalidDependency { name: String, reason: String },
    /// Invalid file entry
    InvalidFile { path: String, reason: String },
    /// Same path listed twice
    DuplicateFile(String),
    /// Same lifecycle phase listed twice in `actions`
    DuplicateAction(ActionType),
    /// Action item naming a plugin the manifest does not declare
    UndeclaredPlugin { action: ActionType, plugin: String },
    /// Action item without a plugin; `index` counts from 1 within its stage
    MissingPlugin {
        action: ActionType,
        stage: &'static str,
        index: usize,
    },
    /// Same plugin listed twice
    DuplicatePlugin(String),
    /// Package depends on itself
    CircularDependency(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidPackageName(name) => {
                write!(f, "Invalid package name: {}", name)
            }
            ValidationError::InvalidDependency { name, reason } => {
                write!(f, "Invalid dependency '{}': {}", name, reason)
            }
            ValidationError::InvalidFile { path, reason } => {
                write!(f, "Invalid file '{}': {}", path, reason)
            }
            ValidationError::DuplicateFile(path) => {
                write!(f, "Duplicate file path: {}", path)
            }
            ValidationError::DuplicateAction(action) => {
                write!(f, "Duplicate action: {}", action)
            }
            ValidationError::UndeclaredPlugin { action, plugin } => {
                write!(f, "Action '{}' uses undeclared plugin '{}'", action, plugin)
            }
            ValidationError::MissingPlugin {
                action,
                stage,
                index,
            } => {
                write!(f, "Action {} {} item {} names no plugin", action, stage, index)
            }
            ValidationError::DuplicatePlugin(name) => {
                write!(f, "Duplicate plugin: {}", name)
            }
            ValidationError::CircularDependency(cycle) => {
                write!(f, "Circular dependency detected: {}", cycle)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for PackageError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::InvalidPackageName(name) => PackageError::InvalidName(name),
            ValidationError::CircularDependency(cycle) => PackageError::CyclicDependency(cycle),
            other => PackageError::InvalidManifest(other.to_string()),
        }
    }
}

/// Package manifest validator
pub struct Validator;

impl Validator {
    /// Validate package manifest, collecting every problem
    pub fn validate(manifest: &Manifest) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if PackageName::validate(manifest.name.as_str()).is_err() {
            errors.push(ValidationError::InvalidPackageName(
                manifest.name.to_string(),
            ));
        }

        errors.extend(Self::validate_dependencies(manifest));
        errors.extend(Self::validate_files(manifest));
        errors.extend(Self::validate_actions(manifest));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a sha256 digest written as lowercase hex
    pub fn validate_digest(digest: &str) -> bool {
        digest.len() == 64
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    fn validate_dependencies(manifest: &Manifest) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for dep in &manifest.dependencies {
            if PackageName::validate(dep.name.as_str()).is_err() {
                errors.push(ValidationError::InvalidPackageName(dep.name.to_string()));
            }

            if !dep.requires.is_valid() {
                errors.push(ValidationError::InvalidDependency {
                    name: dep.name.to_string(),
                    reason: format!("invalid requirement bits {:#05b}", dep.requires.bits()),
                });
            }

            if dep.relationship.is_hard() && dep.name == manifest.name {
                errors.push(ValidationError::CircularDependency(format!(
                    "{} -> {}",
                    manifest.name, dep.name
                )));
            }
        }

        errors
    }

    fn validate_files(manifest: &Manifest) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for file in &manifest.files {
            if file.path.is_empty() {
                errors.push(ValidationError::InvalidFile {
                    path: file.path.clone(),
                    reason: "path cannot be empty".to_string(),
                });
                continue;
            }

            if !seen.insert(file.path.as_str()) {
                errors.push(ValidationError::DuplicateFile(file.path.clone()));
            }

            if !Self::validate_digest(&file.sha256) {
                errors.push(ValidationError::InvalidFile {
                    path: file.path.clone(),
                    reason: "hash must be 64 lowercase hex characters".to_string(),
                });
            }
        }

        errors
    }

    fn validate_actions(manifest: &Manifest) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut plugins = HashSet::new();
        for plugin in &manifest.plugins {
            if !plugins.insert(plugin.name.as_str()) {
                errors.push(ValidationError::DuplicatePlugin(plugin.name.to_string()));
            }
        }

        // Each lifecycle phase at most once; triggers may repeat per package
        let mut phases = HashSet::new();
        for action in &manifest.actions {
            if !phases.insert(action.action_type) {
                errors.push(ValidationError::DuplicateAction(action.action_type));
            }
        }

        for action in manifest.actions.iter().chain(&manifest.triggers) {
            errors.extend(Self::undeclared_plugins(action, &plugins));
        }

        errors
    }

    fn undeclared_plugins(action: &Action, declared: &HashSet<&str>) -> Vec<ValidationError> {
        let stages = [("before", &action.before), ("after", &action.after)];

        let mut errors = Vec::new();
        for (stage, items) in stages {
            for (index, item) in items.iter().enumerate() {
                match &item.plugin {
                    None => errors.push(ValidationError::MissingPlugin {
                        action: action.action_type,
                        stage,
                        index: index + 1,
                    }),
                    Some(plugin) if !declared.contains(plugin.as_str()) => {
                        errors.push(ValidationError::UndeclaredPlugin {
                            action: action.action_type,
                            plugin: plugin.to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ActionItem, Dependency, File, Relationship, Required};
    use crate::version::Version;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    fn manifest() -> Manifest {
        Manifest::new(name("app"), Version::new(1, 0, 0))
    }

    #[test]
    fn test_valid_manifest() {
        let m = manifest()
            .with_plugin(name("shell"))
            .with_file(File::for_contents("/usr/bin/app", b"binary"))
            .with_action(Action::new(ActionType::Install).after(ActionItem::new(
                name("shell"),
                serde_yaml::Value::Null,
            )));
        assert!(Validator::validate(&m).is_ok());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_duplicate_file_path() {
        let m = manifest()
            .with_file(File::for_contents("/etc/app", b"one"))
            .with_file(File::for_contents("/etc/app", b"two"));

        let errors = Validator::validate(&m).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateFile("/etc/app".to_string())]);
        assert!(matches!(m.validate(), Err(PackageError::InvalidManifest(_))));
    }

    #[test]
    fn test_duplicate_action_type() {
        let m = manifest()
            .with_action(Action::new(ActionType::Remove))
            .with_action(Action::new(ActionType::Remove));

        let errors = Validator::validate(&m).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateAction(ActionType::Remove)));
    }

    #[test]
    fn test_repeated_trigger_types_are_allowed() {
        let m = manifest()
            .with_trigger(Action::new(ActionType::Install).on_package(name("a")))
            .with_trigger(Action::new(ActionType::Install).on_package(name("b")));
        assert!(Validator::validate(&m).is_ok());
    }

    #[test]
    fn test_invalid_requirement_bits() {
        let m = manifest().with_dependency(Dependency::new(
            name("lib"),
            Relationship::Depends,
            Required::GREATER_THAN | Required::LESS_THAN,
            Version::new(1, 0, 0),
        ));

        let errors = Validator::validate(&m).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidDependency { .. }));
    }

    #[test]
    fn test_malformed_hash() {
        let mut file = File::for_contents("/bin/x", b"x");
        file.sha256 = "ABC".to_string();
        let m = manifest().with_file(file);

        let errors = Validator::validate(&m).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidFile { .. }));
    }

    #[test]
    fn test_undeclared_plugin() {
        let m = manifest().with_action(
            Action::new(ActionType::Install)
                .before(ActionItem::new(name("ghost"), serde_yaml::Value::Null)),
        );

        let errors = Validator::validate(&m).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UndeclaredPlugin {
                action: ActionType::Install,
                plugin: "ghost".to_string()
            }]
        );
    }

    #[test]
    fn test_item_without_plugin() {
        let mut anonymous = ActionItem::new(name("shell"), serde_yaml::Value::Null);
        anonymous.plugin = None;
        let m = manifest().with_plugin(name("shell")).with_action(
            Action::new(ActionType::Remove)
                .before(ActionItem::new(name("shell"), serde_yaml::Value::Null))
                .before(anonymous),
        );

        let errors = Validator::validate(&m).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingPlugin {
                action: ActionType::Remove,
                stage: "before",
                index: 2,
            }]
        );
    }

    #[test]
    fn test_self_dependency_is_circular() {
        let m = manifest().with_dependency(Dependency::new(
            name("app"),
            Relationship::Predepends,
            Required::EQUAL,
            Version::new(1, 0, 0),
        ));

        assert!(matches!(m.validate(), Err(PackageError::CyclicDependency(_))));
    }

    #[test]
    fn test_digest_format() {
        assert!(Validator::validate_digest(&"a".repeat(64)));
        assert!(!Validator::validate_digest(&"a".repeat(63)));
        assert!(!Validator::validate_digest(&"G".repeat(64)));
    }
}
