//! Plugins that carry out action items

use super::FileSystemProvider;
use crate::certificate::{CertificateProvider, CertificateRequest};
use crate::embedded::EmbeddedFileContents;
use crate::manifest::{ActionItem, ActionType, Manifest, PackageName};
use crate::names::{impl_named_enum, NamedEnum};
use crate::version::Version;
use crate::PackageError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a plugin does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Build,
    ConfigStore,
    CommandProxy,
    FileGenerator,
    CertificateGenerator,
}

impl NamedEnum for PluginKind {
    const KIND: &'static str = "plugin kind";
    const NAMES: &'static [(Self, &'static str)] = &[
        (PluginKind::Build, "build"),
        (PluginKind::ConfigStore, "config-store"),
        (PluginKind::CommandProxy, "command-proxy"),
        (PluginKind::FileGenerator, "file-generator"),
        (PluginKind::CertificateGenerator, "certificate-generator"),
    ];
}

impl_named_enum!(PluginKind);

/// Which half of an action is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Before,
    After,
}

impl NamedEnum for Stage {
    const KIND: &'static str = "stage";
    const NAMES: &'static [(Self, &'static str)] = &[(Stage::Before, "before"), (Stage::After, "after")];
}

impl_named_enum!(Stage);

/// Plugin failures
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid action payload: {0}")]
    InvalidPayload(#[from] serde_yaml::Error),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("no certificate provider configured")]
    NoCertificateProvider,

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
}

/// Everything a plugin may touch while running one item
#[derive(Clone)]
pub struct PluginContext {
    /// Package that owns the action or trigger
    pub package: PackageName,
    pub version: Version,
    pub phase: ActionType,
    pub stage: Stage,
    /// For triggers: the package whose transition fired it
    pub event_package: Option<PackageName>,
    pub filesystem: Arc<dyn FileSystemProvider>,
    pub certificates: Option<Arc<dyn CertificateProvider>>,
}

impl PluginContext {
    pub fn new(
        manifest: &Manifest,
        phase: ActionType,
        stage: Stage,
        filesystem: Arc<dyn FileSystemProvider>,
    ) -> Self {
        Self {
            package: manifest.name.clone(),
            version: manifest.version.clone(),
            phase,
            stage,
            event_package: None,
            filesystem,
            certificates: None,
        }
    }

    pub fn with_certificates(mut self, provider: Option<Arc<dyn CertificateProvider>>) -> Self {
        self.certificates = provider;
        self
    }

    pub fn for_event(mut self, package: PackageName) -> Self {
        self.event_package = Some(package);
        self
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("package", &self.package)
            .field("version", &self.version)
            .field("phase", &self.phase)
            .field("stage", &self.stage)
            .field("event_package", &self.event_package)
            .field("filesystem", &self.filesystem.backend_name())
            .field("certificates", &self.certificates.is_some())
            .finish()
    }
}

/// Executable capability behind a manifest's `plugins` entry
pub trait TransitionPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn version(&self) -> Version;

    fn kind(&self) -> PluginKind;

    /// Carry out one action item
    fn run(&self, item: &ActionItem, context: &PluginContext) -> Result<(), PluginError>;
}

/// Plugins available to the engine, by name
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn TransitionPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any with the same name
    pub fn register(&mut self, plugin: impl TransitionPlugin + 'static) -> &mut Self {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(&mut self, plugin: Arc<dyn TransitionPlugin>) -> &mut Self {
        tracing::debug!(plugin = plugin.name(), kind = %plugin.kind(), "registered plugin");
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TransitionPlugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Check every plugin a manifest declares is registered
    pub fn check(&self, manifest: &Manifest) -> Result<(), PackageError> {
        match manifest
            .plugins
            .iter()
            .find(|p| !self.plugins.contains_key(p.name.as_str()))
        {
            Some(missing) => Err(PackageError::UnknownPlugin {
                package: manifest.name.to_string(),
                plugin: missing.name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Check every item names a registered plugin
    pub fn check_items<'a>(
        &self,
        package: &str,
        items: impl IntoIterator<Item = &'a ActionItem>,
    ) -> Result<(), PackageError> {
        match items
            .into_iter()
            .find(|item| !self.plugins.contains_key(item.plugin_name()))
        {
            Some(item) => Err(PackageError::UnknownPlugin {
                package: package.to_string(),
                plugin: item.plugin_name().to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedFile {
    path: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    data: Option<EmbeddedFileContents>,
    #[serde(default)]
    mode: u32,
}

/// Writes a file described by the item payload
///
/// ```yaml
/// plugin: files
/// action:
///   path: /etc/motd
///   text: "welcome\n"
///   mode: 420
/// ```
///
/// Binary contents go in `data` as ASCII85 text.
#[derive(Debug, Clone)]
pub struct FileGeneratorPlugin {
    name: String,
}

impl FileGeneratorPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TransitionPlugin for FileGeneratorPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "writes files from action payloads"
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn kind(&self) -> PluginKind {
        PluginKind::FileGenerator
    }

    fn run(&self, item: &ActionItem, context: &PluginContext) -> Result<(), PluginError> {
        let file: GeneratedFile = serde_yaml::from_value(item.payload.clone())?;
        let contents = match (file.text, file.data) {
            (Some(text), None) => text.into_bytes(),
            (None, Some(data)) => data.into_bytes(),
            (None, None) => Vec::new(),
            (Some(_), Some(_)) => {
                return Err(PluginError::Failed(format!(
                    "{}: give either text or data, not both",
                    file.path
                )))
            }
        };

        if let Some(parent) = super::parent_dir(&file.path) {
            context.filesystem.mkdir_all(parent)?;
        }
        context.filesystem.write_file(&file.path, &contents, file.mode)?;
        Ok(())
    }
}

/// Issues a certificate through the context's certificate provider and
/// writes the PEM files to the requested paths
#[derive(Debug, Clone)]
pub struct CertificatePlugin {
    name: String,
}

impl CertificatePlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TransitionPlugin for CertificatePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "generates certificates"
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn kind(&self) -> PluginKind {
        PluginKind::CertificateGenerator
    }

    fn run(&self, item: &ActionItem, context: &PluginContext) -> Result<(), PluginError> {
        let request: CertificateRequest = serde_yaml::from_value(item.payload.clone())?;
        request.validate()?;

        let provider = context
            .certificates
            .as_ref()
            .ok_or(PluginError::NoCertificateProvider)?;
        let certificate = provider.generate(&request)?;

        for (path, bytes, mode) in [
            (&request.path.certificate, &certificate.certificate, 0o644),
            (&request.path.key, &certificate.key, 0o600),
        ] {
            if let Some(parent) = super::parent_dir(path) {
                context.filesystem.mkdir_all(parent)?;
            }
            context.filesystem.write_file(path, bytes, mode)?;
        }
        Ok(())
    }
}
