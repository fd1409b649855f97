//! Package manifest types (the YAML document stored in every archive)

use crate::names::{impl_named_enum, NamedEnum};
use crate::version::Version;
use crate::{PackageError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Name of a package or plugin: lowercase ASCII letters, digits, `-` and `_`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Create a validated name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Check that a name only uses `[a-z0-9_-]`
    pub fn validate(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

        if valid {
            Ok(())
        } else {
            Err(PackageError::InvalidName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PackageName {
    type Error = PackageError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PackageName {
    type Error = PackageError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

bitflags::bitflags! {
    /// Version comparison a dependency requires
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Required: u8 {
        const EQUAL = 1;
        const GREATER_THAN = 1 << 1;
        const LESS_THAN = 1 << 2;
        const GREATER_THAN_EQUAL = Self::EQUAL.bits() | Self::GREATER_THAN.bits();
        const LESS_THAN_EQUAL = Self::EQUAL.bits() | Self::LESS_THAN.bits();
    }
}

impl Required {
    /// Only the five named combinations are meaningful
    pub fn is_valid(&self) -> bool {
        Self::NAMES.iter().any(|(value, _)| value == self)
    }

    /// Does `actual` satisfy this requirement against `wanted`?
    pub fn matches(&self, actual: &Version, wanted: &Version) -> bool {
        match actual.cmp(wanted) {
            std::cmp::Ordering::Equal => self.contains(Required::EQUAL),
            std::cmp::Ordering::Greater => self.contains(Required::GREATER_THAN),
            std::cmp::Ordering::Less => self.contains(Required::LESS_THAN),
        }
    }
}

impl NamedEnum for Required {
    const KIND: &'static str = "version requirement";
    const NAMES: &'static [(Self, &'static str)] = &[
        (Required::EQUAL, "=="),
        (Required::GREATER_THAN, ">>"),
        (Required::GREATER_THAN_EQUAL, ">="),
        (Required::LESS_THAN, "<<"),
        (Required::LESS_THAN_EQUAL, "<="),
    ];
}

impl_named_enum!(Required);

/// Relationship between a package and one of its dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    Suggests,
    Recommends,
    Depends,
    Predepends,
    Breaks,
    Conflicts,
    Provides,
    Replaces,
}

impl Relationship {
    /// Depends or Predepends: must be satisfied and ordered first
    pub fn is_hard(&self) -> bool {
        matches!(self, Relationship::Depends | Relationship::Predepends)
    }

    /// Breaks or Conflicts: must not be satisfied
    pub fn is_negative(&self) -> bool {
        matches!(self, Relationship::Breaks | Relationship::Conflicts)
    }

    /// Suggests or Recommends: only reported
    pub fn is_advisory(&self) -> bool {
        matches!(self, Relationship::Suggests | Relationship::Recommends)
    }

    /// Provides or Replaces: registers a virtual identity
    pub fn is_identity(&self) -> bool {
        matches!(self, Relationship::Provides | Relationship::Replaces)
    }
}

impl NamedEnum for Relationship {
    const KIND: &'static str = "relationship";
    const NAMES: &'static [(Self, &'static str)] = &[
        (Relationship::Suggests, "suggests"),
        (Relationship::Recommends, "recommends"),
        (Relationship::Depends, "depends"),
        (Relationship::Predepends, "predepends"),
        (Relationship::Breaks, "breaks"),
        (Relationship::Conflicts, "conflicts"),
        (Relationship::Provides, "provides"),
        (Relationship::Replaces, "replaces"),
    ];
}

impl_named_enum!(Relationship);

/// A related package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: PackageName,
    pub version: Version,
    pub requires: Required,
    #[serde(rename = "relation")]
    pub relationship: Relationship,
}

impl Dependency {
    pub fn new(
        name: PackageName,
        relationship: Relationship,
        requires: Required,
        version: Version,
    ) -> Self {
        Self {
            name,
            version,
            requires,
            relationship,
        }
    }

    /// Does `version` satisfy this dependency's version requirement?
    pub fn accepts(&self, version: &Version) -> bool {
        self.requires.matches(version, &self.version)
    }

    /// Requirement as text, e.g. `>= v1.0.0`
    pub fn requirement(&self) -> String {
        format!("{} {}", self.requires, self.version)
    }
}

/// Category of a package file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    Configuration,
    Executable,
    Data,
    #[default]
    Other,
}

impl NamedEnum for FileType {
    const KIND: &'static str = "file type";
    const NAMES: &'static [(Self, &'static str)] = &[
        (FileType::Configuration, "config"),
        (FileType::Executable, "exec"),
        (FileType::Data, "data"),
        (FileType::Other, "other"),
    ];
    const EMPTY: Option<Self> = Some(FileType::Other);
}

impl_named_enum!(FileType);

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// A file shipped by a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    #[serde(rename = "type", default)]
    pub file_type: FileType,
    /// Shared with other packages: kept on remove, deleted on purge
    #[serde(rename = "common", default, skip_serializing_if = "is_false")]
    pub is_common: bool,
    #[serde(rename = "hash")]
    pub sha256: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub mode: u32,
}

impl File {
    /// Describe `contents` stored at `path`, hashing the bytes
    pub fn for_contents(path: impl Into<String>, contents: &[u8]) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::Other,
            is_common: false,
            sha256: crate::archive::sha256_hex(contents),
            user: String::new(),
            group: String::new(),
            mode: 0,
        }
    }

    pub fn with_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_owner(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.user = user.into();
        self.group = group.into();
        self
    }

    pub fn common(mut self) -> Self {
        self.is_common = true;
        self
    }

    pub fn is_configuration(&self) -> bool {
        self.file_type == FileType::Configuration
    }
}

/// Lifecycle phase an action belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionType {
    Install,
    Reconfigure,
    Upgrade,
    Remove,
    Purge,
}

impl NamedEnum for ActionType {
    const KIND: &'static str = "action type";
    const NAMES: &'static [(Self, &'static str)] = &[
        (ActionType::Install, "install"),
        (ActionType::Reconfigure, "reconfigure"),
        (ActionType::Upgrade, "upgrade"),
        (ActionType::Remove, "remove"),
        (ActionType::Purge, "purge"),
    ];
}

impl_named_enum!(ActionType);

/// One step of an action, interpreted by the named plugin
///
/// An item without a plugin still parses; validation rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PackageName>,
    #[serde(rename = "action", default)]
    pub payload: serde_yaml::Value,
}

impl ActionItem {
    pub fn new(plugin: PackageName, payload: serde_yaml::Value) -> Self {
        Self {
            plugin: Some(plugin),
            payload,
        }
    }

    /// Plugin name, empty when the item names none
    pub fn plugin_name(&self) -> &str {
        self.plugin.as_ref().map_or("", PackageName::as_str)
    }
}

/// Items to run before and after a lifecycle phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// For triggers: the package whose event fires this action (any when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<ActionItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<ActionItem>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            package: None,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Restrict a trigger to events of one package
    pub fn on_package(mut self, package: PackageName) -> Self {
        self.package = Some(package);
        self
    }

    pub fn before(mut self, item: ActionItem) -> Self {
        self.before.push(item);
        self
    }

    pub fn after(mut self, item: ActionItem) -> Self {
        self.after.push(item);
        self
    }

    /// Does this trigger fire for `event` on `package`?
    pub fn fires_for(&self, event: ActionType, package: &str) -> bool {
        self.action_type == event
            && self
                .package
                .as_ref()
                .map_or(true, |wanted| wanted.as_str() == package)
    }
}

/// Target architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Architecture {
    #[default]
    Amd64,
    Arm64,
}

impl Architecture {
    /// Base architecture and variant, as docker platforms spell them
    pub fn split(&self) -> (&'static str, &'static str) {
        match self {
            Architecture::Amd64 => ("amd64", ""),
            Architecture::Arm64 => ("arm64", "v8"),
        }
    }
}

impl NamedEnum for Architecture {
    const KIND: &'static str = "architecture";
    const NAMES: &'static [(Self, &'static str)] = &[
        (Architecture::Amd64, "amd64"),
        (Architecture::Arm64, "arm64"),
    ];
    const EMPTY: Option<Self> = Some(Architecture::Amd64);
}

impl_named_enum!(Architecture);

/// Target operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperatingSystem {
    #[default]
    Linux,
}

impl NamedEnum for OperatingSystem {
    const KIND: &'static str = "operating system";
    const NAMES: &'static [(Self, &'static str)] = &[(OperatingSystem::Linux, "linux")];
    const EMPTY: Option<Self> = Some(OperatingSystem::Linux);
}

impl_named_enum!(OperatingSystem);

/// Free-form metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

/// Descriptive package metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "arch", default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<Architecture>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<MetadataItem>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.description.is_empty() && self.architectures.is_empty() && self.items.is_empty()
    }

    /// Look up a free-form item
    pub fn item(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }
}

/// A plugin the package needs at install time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: PackageName,
}

/// Declarative description of one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: PackageName,
    pub version: Version,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(rename = "depends", default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

impl Manifest {
    /// Empty manifest created now
    pub fn new(name: PackageName, version: Version) -> Self {
        Self {
            name,
            version,
            created: Utc::now(),
            metadata: Metadata::default(),
            dependencies: Vec::new(),
            files: Vec::new(),
            actions: Vec::new(),
            triggers: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Parse manifest from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Fail on the first problem the validator finds
    pub fn validate(&self) -> Result<()> {
        match crate::validator::Validator::validate(self) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .into_iter()
                .next()
                .map(PackageError::from)
                .unwrap_or_else(|| PackageError::InvalidManifest(self.name.to_string()))),
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_file(mut self, file: File) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_trigger(mut self, trigger: Action) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_plugin(mut self, name: PackageName) -> Self {
        self.plugins.push(Plugin { name });
        self
    }

    /// The action for a lifecycle phase, if declared
    pub fn action(&self, action_type: ActionType) -> Option<&Action> {
        self.actions.iter().find(|a| a.action_type == action_type)
    }

    pub fn file(&self, path: &str) -> Option<&File> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn declares_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name.as_str() == name)
    }

    /// Depends and Predepends entries
    pub fn hard_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.relationship.is_hard())
    }

    /// Version under which this package answers to `name`, either its own
    /// name or a Provides/Replaces identity
    pub fn identity_version(&self, name: &str) -> Option<&Version> {
        if self.name.as_str() == name {
            return Some(&self.version);
        }
        self.dependencies
            .iter()
            .find(|d| d.relationship.is_identity() && d.name.as_str() == name)
            .map(|d| &d.version)
    }

    /// Does this package satisfy `dependency`?
    pub fn satisfies(&self, dependency: &Dependency) -> bool {
        self.identity_version(dependency.name.as_str())
            .is_some_and(|version| dependency.accepts(version))
    }

    /// Triggers that fire for `event` on `package`
    pub fn triggers_for<'a>(
        &'a self,
        event: ActionType,
        package: &'a str,
    ) -> impl Iterator<Item = &'a Action> + 'a {
        self.triggers
            .iter()
            .filter(move |t| t.fires_for(event, package))
    }
}
