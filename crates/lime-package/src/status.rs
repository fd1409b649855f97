//! Package status database (status.yaml)

use crate::manifest::Manifest;
use crate::names::{impl_named_enum, NamedEnum};
use crate::{PackageError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Where a package is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PackageState {
    #[default]
    NotInstalled,
    /// Files are being written; not terminal
    Installing,
    Installed,
    /// New version files are being written; not terminal
    Upgrading,
    /// Files are being deleted by a remove or purge; not terminal
    Removing,
    Removed,
    Purged,
}

impl PackageState {
    /// Install may start from here
    pub fn is_installable(&self) -> bool {
        matches!(
            self,
            PackageState::NotInstalled | PackageState::Removed | PackageState::Purged
        )
    }

    /// A transition stopped part way
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PackageState::Installing | PackageState::Upgrading | PackageState::Removing
        )
    }
}

impl NamedEnum for PackageState {
    const KIND: &'static str = "package state";
    const NAMES: &'static [(Self, &'static str)] = &[
        (PackageState::NotInstalled, "not-installed"),
        (PackageState::Installing, "installing"),
        (PackageState::Installed, "installed"),
        (PackageState::Upgrading, "upgrading"),
        (PackageState::Removing, "removing"),
        (PackageState::Removed, "removed"),
        (PackageState::Purged, "purged"),
    ];
}

impl_named_enum!(PackageState);

/// Status of one known package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Manifest of the installed (or last installed) version
    pub manifest: Manifest,
    pub state: PackageState,
    /// Last state change
    pub updated: DateTime<Utc>,
    /// Files written by the last install or upgrade
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub written_files: Vec<String>,
}

impl PackageRecord {
    pub fn new(manifest: Manifest, state: PackageState) -> Self {
        Self {
            manifest,
            state,
            updated: Utc::now(),
            written_files: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.manifest.name.as_str()
    }

    /// Move to `state`, stamping the time
    pub fn set_state(&mut self, state: PackageState) {
        self.state = state;
        self.updated = Utc::now();
    }
}

/// Every package the engine has seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDatabase {
    /// Status file format version
    pub version: u32,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
}

impl StatusDatabase {
    /// Current status file format version
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            packages: Vec::new(),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let database: Self = serde_yaml::from_str(content)?;
        database.verify()?;
        Ok(database)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load from disk; a missing file is an empty database
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to disk through a temporary file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("yaml.tmp");
        std::fs::write(&temp, self.to_yaml()?)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    /// Add or replace a record
    pub fn upsert(&mut self, record: PackageRecord) {
        self.packages.retain(|p| p.name() != record.name());
        self.packages.push(record);
        self.packages.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PackageRecord> {
        self.packages.iter_mut().find(|p| p.name() == name)
    }

    /// Drop a record entirely
    pub fn remove(&mut self, name: &str) -> bool {
        let len = self.packages.len();
        self.packages.retain(|p| p.name() != name);
        len != self.packages.len()
    }

    /// State of a package, NotInstalled when unknown
    pub fn state(&self, name: &str) -> PackageState {
        self.get(name).map(|p| p.state).unwrap_or_default()
    }

    /// Records in the Installed state
    pub fn installed(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages
            .iter()
            .filter(|p| p.state == PackageState::Installed)
    }

    /// Records that are Installed or stuck in a transient state
    pub fn present(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages
            .iter()
            .filter(|p| p.state == PackageState::Installed || p.state.is_transient())
    }

    /// Check format version and uniqueness
    pub fn verify(&self) -> Result<()> {
        if self.version > Self::VERSION {
            return Err(PackageError::Status(format!(
                "status file version {} is newer than supported version {}",
                self.version,
                Self::VERSION
            )));
        }

        let mut seen = HashSet::new();
        for record in &self.packages {
            if !seen.insert(record.name()) {
                return Err(PackageError::Status(format!(
                    "duplicate package in status file: {}",
                    record.name()
                )));
            }
        }

        Ok(())
    }
}

impl Default for StatusDatabase {
    fn default() -> Self {
        Self::new()
    }
}
