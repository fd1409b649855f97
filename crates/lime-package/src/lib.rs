//! Lime package format and lifecycle engine
//!
//! A lime package is a single binary archive holding a YAML manifest, a file
//! index and the (optionally compressed) file payloads. This crate builds and
//! opens those archives, resolves manifest dependencies against installed
//! packages, and drives the install/reconfigure/upgrade/remove/purge state
//! machine through pluggable filesystem, plugin and certificate providers.

pub mod archive;
pub mod build;
pub mod certificate;
pub mod embedded;
pub mod install_order;
pub mod lifecycle;
pub mod manifest;
pub mod names;
pub mod provider;
pub mod resolver;
pub mod settings;
pub mod status;
pub mod validator;
pub mod version;

pub use archive::{
    Compression, EntryReader, FileIndex, FileIndexEntry, PackageArchive, PackageBuilder,
    PackageSource, MAGIC,
};
pub use certificate::{
    Certificate, CertificateName, CertificatePath, CertificateProvider, CertificateRequest,
    KeyAlgorithm, KeyRequest,
};
pub use embedded::{EmbeddedFileContents, EmbeddedFiles};
pub use install_order::InstallOrderComputer;
pub use lifecycle::{Engine, NameLocks, TransitionReport};
pub use manifest::{
    Action, ActionItem, ActionType, Architecture, Dependency, File, FileType, Manifest, Metadata,
    MetadataItem, OperatingSystem, PackageName, Plugin, Relationship, Required,
};
pub use build::DockerBuildRequest;
pub use provider::{
    CertificatePlugin, DiskFileSystem, FileGeneratorPlugin, FileStat, FileSystemProvider,
    MemoryFileSystem, PluginContext, PluginError, PluginKind, PluginRegistry, Stage,
    TransitionPlugin,
};
pub use resolver::{ConflictChecker, Diagnostic, PackageCatalog, Resolution, Resolver};
pub use settings::{ArchiveSettings, EngineSettings};
pub use status::{PackageRecord, PackageState, StatusDatabase};
pub use validator::{ValidationError, Validator};
pub use version::Version;

use std::time::Duration;

/// Package management errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid package name '{0}': only lowercase letters, digits, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Format error in {section}: {reason}")]
    Format { section: String, reason: String },

    #[error("Integrity error for '{path}': {reason}")]
    Integrity { path: String, reason: String },

    #[error("Unresolved dependency: '{package}' requires {dependency} {requirement}")]
    UnresolvedDependency {
        package: String,
        dependency: String,
        requirement: String,
    },

    #[error("Dependency conflict: '{package}' {relation} '{other}'")]
    DependencyConflict {
        package: String,
        other: String,
        relation: String,
    },

    #[error("Circular dependency detected: {0}")]
    CyclicDependency(String),

    #[error("Upgrade of '{package}' would break '{dependent}': {reason}")]
    BreakingUpgrade {
        package: String,
        dependent: String,
        reason: String,
    },

    #[error("Cannot remove '{package}': still required by {}", dependents.join(", "))]
    DependentPackagesExist {
        package: String,
        dependents: Vec<String>,
    },

    #[error("Partial failure in '{package}': '{failed}' failed after {} completed file(s): {reason}", completed.len())]
    PartialFailure {
        package: String,
        completed: Vec<String>,
        failed: String,
        reason: String,
    },

    #[error("Action for '{package}' using plugin '{plugin}' exceeded {timeout:?}")]
    TriggerTimeout {
        package: String,
        plugin: String,
        timeout: Duration,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Cannot {operation} '{package}' while it is {state}")]
    InvalidState {
        package: String,
        state: PackageState,
        operation: String,
    },

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Plugin '{plugin}' is not available to '{package}'")]
    UnknownPlugin { package: String, plugin: String },

    #[error("Plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("Status database error: {0}")]
    Status(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] lime_config::ConfigError),
}

impl PackageError {
    pub(crate) fn format(section: impl Into<String>, reason: impl Into<String>) -> Self {
        PackageError::Format {
            section: section.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PackageError::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any state change: parse, format,
    /// integrity and resolution failures. These are never worth retrying.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PackageError::InvalidVersion(_)
                | PackageError::InvalidName(_)
                | PackageError::InvalidManifest(_)
                | PackageError::Format { .. }
                | PackageError::Integrity { .. }
                | PackageError::UnresolvedDependency { .. }
                | PackageError::DependencyConflict { .. }
                | PackageError::CyclicDependency(_)
                | PackageError::BreakingUpgrade { .. }
                | PackageError::Encoding(_)
                | PackageError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;
