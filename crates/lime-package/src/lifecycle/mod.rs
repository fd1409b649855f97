//! Package lifecycle state machine
//!
//! ```text
//! NotInstalled ─install─▶ Installing ─▶ Installed ─remove─▶ Removing ─▶ Removed ─purge─▶ Purged
//!                                        │     ▲   ╲                                      ▲
//!                                upgrade ▼     │    ╲──────────────purge──────────────────╯
//!                                        Upgrading
//! ```
//!
//! Each transition runs the package's `before` items, the `before` items of
//! triggers other installed packages registered for the event, mutates
//! files, then runs the `after` items of both. The terminal state is only
//! recorded once every step has succeeded. A purge of an installed package
//! runs the Remove and Purge `before` items ahead of any deletion.

mod locks;

pub use locks::{NameGuard, NameLocks};

use crate::archive::PackageSource;
use crate::certificate::CertificateProvider;
use crate::install_order::InstallOrderComputer;
use crate::manifest::{Action, ActionItem, ActionType, File, Manifest};
use crate::provider::{
    parent_dir, DiskFileSystem, FileSystemProvider, PluginContext, PluginError, PluginRegistry,
    Stage,
};
use crate::resolver::{Diagnostic, Resolution, Resolver};
use crate::settings::EngineSettings;
use crate::status::{PackageRecord, PackageState, StatusDatabase};
use crate::{PackageError, Result};
use crossbeam_channel::RecvTimeoutError;
use lime_config::Config;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// Outcome of one package transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub package: String,
    pub action: ActionType,
    pub from: PackageState,
    pub to: PackageState,
    pub files_written: Vec<String>,
    pub files_removed: Vec<String>,
    /// Packages whose triggers ran for this transition
    pub triggers_fired: Vec<String>,
    /// Unsatisfied Suggests/Recommends entries
    pub diagnostics: Vec<Diagnostic>,
}

impl TransitionReport {
    fn new(package: &str, action: ActionType, from: PackageState) -> Self {
        Self {
            package: package.to_string(),
            action,
            from,
            to: from,
            files_written: Vec::new(),
            files_removed: Vec::new(),
            triggers_fired: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Drives packages through their lifecycle
///
/// Transitions take `&self`; the engine can be shared between threads and
/// serializes transactions whose package names overlap.
pub struct Engine {
    filesystem: Arc<dyn FileSystemProvider>,
    plugins: PluginRegistry,
    certificates: Option<Arc<dyn CertificateProvider>>,
    settings: EngineSettings,
    status: Mutex<StatusDatabase>,
    locks: NameLocks,
}

impl Engine {
    pub fn new(filesystem: Arc<dyn FileSystemProvider>, plugins: PluginRegistry) -> Self {
        Self {
            filesystem,
            plugins,
            certificates: None,
            settings: EngineSettings::default(),
            status: Mutex::new(StatusDatabase::new()),
            locks: NameLocks::new(),
        }
    }

    /// Engine over the configured root directory and status file
    pub fn from_config(config: &Config, plugins: PluginRegistry) -> Result<Self> {
        let settings = EngineSettings::from_config(config);
        let status = StatusDatabase::load(&settings.status_file)?;
        let filesystem = Arc::new(DiskFileSystem::new(settings.root.clone()));

        tracing::info!(
            root = %settings.root.display(),
            packages = status.packages.len(),
            "lifecycle engine ready"
        );

        Ok(Self::new(filesystem, plugins)
            .with_settings(settings)
            .with_status(status))
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_certificates(mut self, provider: Arc<dyn CertificateProvider>) -> Self {
        self.certificates = Some(provider);
        self
    }

    /// Start from a previously saved status database
    pub fn with_status(mut self, status: StatusDatabase) -> Self {
        self.status = Mutex::new(status);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystemProvider> {
        &self.filesystem
    }

    /// Snapshot of the status database
    pub fn status(&self) -> StatusDatabase {
        self.status.lock().clone()
    }

    pub fn state(&self, name: &str) -> PackageState {
        self.status.lock().state(name)
    }

    pub fn record(&self, name: &str) -> Option<PackageRecord> {
        self.status.lock().get(name).cloned()
    }

    pub fn save_status(&self, path: &Path) -> Result<()> {
        self.status.lock().save(path)
    }

    /// Save to the configured status file
    pub fn save(&self) -> Result<()> {
        self.save_status(&self.settings.status_file)
    }

    pub fn install(&self, source: &dyn PackageSource) -> Result<TransitionReport> {
        self.install_batch(&[source])?
            .pop()
            .ok_or_else(|| PackageError::PackageNotFound(source.manifest().name.to_string()))
    }

    /// Install packages resolved together, dependencies first
    ///
    /// Stops at the first failure; packages installed before it stay
    /// installed.
    pub fn install_batch(&self, sources: &[&dyn PackageSource]) -> Result<Vec<TransitionReport>> {
        let manifests: Vec<Manifest> = sources.iter().map(|s| s.manifest().clone()).collect();
        let _guard = self.locks.acquire(self.touched(&manifests));

        for manifest in &manifests {
            let state = self.state(manifest.name.as_str());
            if !(state.is_installable() || state == PackageState::Installing) {
                return Err(invalid_state(manifest.name.as_str(), state, "install"));
            }
            self.plugins.check(manifest)?;
        }

        let snapshot = self.status();
        let resolution = Resolver::new(&snapshot).resolve_batch(&manifests)?;

        let mut reports = Vec::with_capacity(sources.len());
        for name in &resolution.order {
            let source = sources
                .iter()
                .copied()
                .find(|s| s.manifest().name.as_str() == name)
                .ok_or_else(|| PackageError::PackageNotFound(name.clone()))?;
            reports.push(self.install_one(source, &resolution)?);
        }
        Ok(reports)
    }

    fn install_one(
        &self,
        source: &dyn PackageSource,
        resolution: &Resolution,
    ) -> Result<TransitionReport> {
        let manifest = source.manifest();
        let name = manifest.name.as_str();
        let mut report = TransitionReport::new(name, ActionType::Install, self.state(name));
        report.diagnostics = resolution
            .diagnostics
            .iter()
            .filter(|d| d.package == name)
            .cloned()
            .collect();

        for target in resolution.predepends_of(name) {
            if self.state(target) != PackageState::Installed {
                return Err(PackageError::UnresolvedDependency {
                    package: name.to_string(),
                    dependency: target.to_string(),
                    requirement: "to be installed first (predepends)".to_string(),
                });
            }
        }

        let payloads = read_payloads(source)?;
        let watchers = self.watchers(ActionType::Install, name)?;

        self.run_action(manifest, ActionType::Install, Stage::Before)?;
        self.run_triggers(&watchers, manifest, ActionType::Install, Stage::Before)?;

        self.status
            .lock()
            .upsert(PackageRecord::new(manifest.clone(), PackageState::Installing));
        report.files_written = self.write_files(manifest, &payloads)?;

        self.run_action(manifest, ActionType::Install, Stage::After)?;
        self.run_triggers(&watchers, manifest, ActionType::Install, Stage::After)?;

        report.triggers_fired = package_names(&watchers);
        report.to = self.finish(name, PackageState::Installed);
        Ok(report)
    }

    /// Re-run the Reconfigure action of an installed package
    pub fn reconfigure(&self, name: &str) -> Result<TransitionReport> {
        let current = self.require(name)?;
        let _guard = self
            .locks
            .acquire(self.touched(std::slice::from_ref(&current.manifest)));

        let record = self.require(name)?;
        if record.state != PackageState::Installed {
            return Err(invalid_state(name, record.state, "reconfigure"));
        }
        let manifest = &record.manifest;
        self.plugins.check(manifest)?;

        let mut report = TransitionReport::new(name, ActionType::Reconfigure, record.state);
        let watchers = self.watchers(ActionType::Reconfigure, name)?;

        self.run_action(manifest, ActionType::Reconfigure, Stage::Before)?;
        self.run_triggers(&watchers, manifest, ActionType::Reconfigure, Stage::Before)?;
        self.run_action(manifest, ActionType::Reconfigure, Stage::After)?;
        self.run_triggers(&watchers, manifest, ActionType::Reconfigure, Stage::After)?;

        report.triggers_fired = package_names(&watchers);
        report.to = self.finish(name, PackageState::Installed);
        Ok(report)
    }

    /// Replace an installed package with a new version
    ///
    /// Dependency checks, including installed dependents that the new
    /// version would no longer satisfy, happen before any item runs or any
    /// file is touched.
    pub fn upgrade(&self, source: &dyn PackageSource) -> Result<TransitionReport> {
        let manifest = source.manifest();
        let name = manifest.name.as_str();
        let _guard = self
            .locks
            .acquire(self.touched(std::slice::from_ref(manifest)));

        let record = self.require(name)?;
        if !matches!(
            record.state,
            PackageState::Installed | PackageState::Upgrading
        ) {
            return Err(invalid_state(name, record.state, "upgrade"));
        }
        self.plugins.check(manifest)?;

        let snapshot = self.status();
        let resolver = Resolver::new(&snapshot);
        let resolution = resolver.resolve(manifest)?;
        resolver.check_upgrade(manifest)?;
        let payloads = read_payloads(source)?;

        let mut report = TransitionReport::new(name, ActionType::Upgrade, record.state);
        report.diagnostics = resolution.diagnostics;
        let watchers = self.watchers(ActionType::Upgrade, name)?;

        tracing::info!(
            package = name,
            from = %record.manifest.version,
            to = %manifest.version,
            "upgrading package"
        );

        self.run_action(manifest, ActionType::Upgrade, Stage::Before)?;
        self.run_triggers(&watchers, manifest, ActionType::Upgrade, Stage::Before)?;

        let mut upgrading = PackageRecord::new(manifest.clone(), PackageState::Upgrading);
        upgrading.written_files = record.written_files.clone();
        self.status.lock().upsert(upgrading);
        report.files_written = self.write_files(manifest, &payloads)?;

        let stale = record
            .manifest
            .files
            .iter()
            .filter(|f| !f.is_common && manifest.file(&f.path).is_none());
        report.files_removed = self.remove_files(name, stale)?;

        self.run_action(manifest, ActionType::Upgrade, Stage::After)?;
        self.run_triggers(&watchers, manifest, ActionType::Upgrade, Stage::After)?;

        report.triggers_fired = package_names(&watchers);
        report.to = self.finish(name, PackageState::Installed);
        Ok(report)
    }

    pub fn remove(&self, name: &str) -> Result<TransitionReport> {
        self.remove_batch(&[name])?
            .pop()
            .ok_or_else(|| PackageError::PackageNotFound(name.to_string()))
    }

    /// Remove packages together, dependents first
    ///
    /// A package may be removed while an installed dependent needs it only
    /// when that dependent is part of the same batch.
    pub fn remove_batch(&self, names: &[&str]) -> Result<Vec<TransitionReport>> {
        let manifests = names
            .iter()
            .map(|name| self.require(name).map(|record| record.manifest))
            .collect::<Result<Vec<_>>>()?;
        let _guard = self.locks.acquire(self.touched(&manifests));

        let records = names
            .iter()
            .map(|name| self.require(name))
            .collect::<Result<Vec<_>>>()?;
        for record in &records {
            if !is_removable(record.state) {
                return Err(invalid_state(record.name(), record.state, "remove"));
            }
            self.plugins.check(&record.manifest)?;
        }

        let snapshot = self.status();
        Resolver::new(&snapshot).check_removal(names)?;

        let mut reports = Vec::with_capacity(records.len());
        for name in removal_order(&records)? {
            let record = records
                .iter()
                .find(|r| r.name() == name)
                .ok_or_else(|| PackageError::PackageNotFound(name.clone()))?;
            reports.push(self.remove_one(record)?);
        }
        Ok(reports)
    }

    fn remove_one(&self, record: &PackageRecord) -> Result<TransitionReport> {
        let manifest = &record.manifest;
        let name = record.name();
        let mut report = TransitionReport::new(name, ActionType::Remove, record.state);
        let watchers = self.watchers(ActionType::Remove, name)?;

        self.run_action(manifest, ActionType::Remove, Stage::Before)?;
        self.run_triggers(&watchers, manifest, ActionType::Remove, Stage::Before)?;

        self.update(name, |r| r.set_state(PackageState::Removing));
        report.files_removed = self.remove_files(name, unpacked_files(manifest))?;

        self.run_action(manifest, ActionType::Remove, Stage::After)?;
        self.run_triggers(&watchers, manifest, ActionType::Remove, Stage::After)?;

        report.triggers_fired = package_names(&watchers);
        report.to = self.finish(name, PackageState::Removed);
        Ok(report)
    }

    /// Delete a package's configuration and unclaimed common files
    ///
    /// A package that is not yet Removed goes through removal in the same
    /// transition, under the same dependents check as [`Engine::remove`].
    pub fn purge(&self, name: &str) -> Result<TransitionReport> {
        let current = self.require(name)?;
        let _guard = self
            .locks
            .acquire(self.touched(std::slice::from_ref(&current.manifest)));

        let record = self.require(name)?;
        let removing = match record.state {
            PackageState::Removed => false,
            state if is_removable(state) => true,
            state => return Err(invalid_state(name, state, "purge")),
        };
        self.plugins.check(&record.manifest)?;
        if removing {
            let snapshot = self.status();
            Resolver::new(&snapshot).check_removal(&[name])?;
        }

        let manifest = &record.manifest;
        let mut report = TransitionReport::new(name, ActionType::Purge, record.state);
        let remove_watchers = if removing {
            self.watchers(ActionType::Remove, name)?
        } else {
            Vec::new()
        };
        let purge_watchers = self.watchers(ActionType::Purge, name)?;

        if removing {
            self.run_action(manifest, ActionType::Remove, Stage::Before)?;
            self.run_triggers(&remove_watchers, manifest, ActionType::Remove, Stage::Before)?;
        }
        self.run_action(manifest, ActionType::Purge, Stage::Before)?;
        self.run_triggers(&purge_watchers, manifest, ActionType::Purge, Stage::Before)?;

        if removing {
            self.update(name, |r| r.set_state(PackageState::Removing));
            report.files_removed = self.remove_files(name, unpacked_files(manifest))?;
        }
        let claimed = self.claimed_paths(name);
        let remnants = manifest.files.iter().filter(|f| {
            if f.is_common {
                !claimed.contains(&f.path)
            } else {
                f.is_configuration()
            }
        });
        let removed = self.remove_files(name, remnants)?;
        report.files_removed.extend(removed);

        if removing {
            self.run_action(manifest, ActionType::Remove, Stage::After)?;
            self.run_triggers(&remove_watchers, manifest, ActionType::Remove, Stage::After)?;
        }
        self.run_action(manifest, ActionType::Purge, Stage::After)?;
        self.run_triggers(&purge_watchers, manifest, ActionType::Purge, Stage::After)?;

        report.triggers_fired = package_names(&remove_watchers);
        for watcher in package_names(&purge_watchers) {
            if !report.triggers_fired.contains(&watcher) {
                report.triggers_fired.push(watcher);
            }
        }
        self.update(name, |r| r.written_files.clear());
        report.to = self.finish(name, PackageState::Purged);
        Ok(report)
    }

    fn require(&self, name: &str) -> Result<PackageRecord> {
        self.record(name)
            .ok_or_else(|| PackageError::PackageNotFound(name.to_string()))
    }

    fn update(&self, name: &str, change: impl FnOnce(&mut PackageRecord)) {
        if let Some(record) = self.status.lock().get_mut(name) {
            change(record);
        }
    }

    fn finish(&self, name: &str, state: PackageState) -> PackageState {
        self.update(name, |record| record.set_state(state));
        tracing::info!(package = name, state = %state, "transition complete");
        state
    }

    /// Names one transaction touches: the packages themselves, everything
    /// they reference, and installed packages that depend on them
    fn touched(&self, manifests: &[Manifest]) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut identities = BTreeSet::new();

        for manifest in manifests {
            names.insert(manifest.name.to_string());
            identities.insert(manifest.name.as_str());
            for dep in &manifest.dependencies {
                names.insert(dep.name.to_string());
                if dep.relationship.is_identity() {
                    identities.insert(dep.name.as_str());
                }
            }
        }

        let status = self.status.lock();
        for record in status.present() {
            if record
                .manifest
                .hard_dependencies()
                .any(|dep| identities.contains(dep.name.as_str()))
            {
                names.insert(record.name().to_string());
            }
        }
        names
    }

    /// Installed packages with triggers for `event` on `package`
    ///
    /// Fails with UnknownPlugin when one of those triggers names a plugin
    /// the registry lacks, so nothing has run yet.
    fn watchers(&self, event: ActionType, package: &str) -> Result<Vec<Manifest>> {
        let watchers: Vec<Manifest> = self
            .status
            .lock()
            .installed()
            .filter(|record| record.name() != package)
            .filter(|record| record.manifest.triggers_for(event, package).next().is_some())
            .map(|record| record.manifest.clone())
            .collect();

        for owner in &watchers {
            for trigger in owner.triggers_for(event, package) {
                self.plugins
                    .check_items(owner.name.as_str(), trigger.before.iter().chain(&trigger.after))?;
            }
        }
        Ok(watchers)
    }

    /// File paths declared by other packages still on disk
    fn claimed_paths(&self, package: &str) -> BTreeSet<String> {
        self.status
            .lock()
            .present()
            .filter(|record| record.name() != package)
            .flat_map(|record| record.manifest.files.iter().map(|f| f.path.clone()))
            .collect()
    }

    fn run_action(&self, manifest: &Manifest, phase: ActionType, stage: Stage) -> Result<()> {
        let Some(action) = manifest.action(phase) else {
            return Ok(());
        };
        for item in stage_items(action, stage) {
            self.run_item(item, self.context(manifest, phase, stage))?;
        }
        Ok(())
    }

    fn run_triggers(
        &self,
        watchers: &[Manifest],
        subject: &Manifest,
        event: ActionType,
        stage: Stage,
    ) -> Result<()> {
        for owner in watchers {
            for trigger in owner.triggers_for(event, subject.name.as_str()) {
                for item in stage_items(trigger, stage) {
                    let context = self
                        .context(owner, event, stage)
                        .for_event(subject.name.clone());
                    self.run_item(item, context)?;
                }
            }
        }
        Ok(())
    }

    fn context(&self, manifest: &Manifest, phase: ActionType, stage: Stage) -> PluginContext {
        PluginContext::new(manifest, phase, stage, Arc::clone(&self.filesystem))
            .with_certificates(self.certificates.clone())
    }

    /// Run one item on a worker thread, waiting at most the trigger timeout
    ///
    /// A timed-out worker is left running detached; its result is dropped.
    fn run_item(&self, item: &ActionItem, context: PluginContext) -> Result<()> {
        let plugin_name = item.plugin_name().to_string();
        let package = context.package.to_string();
        let plugin =
            self.plugins
                .get(&plugin_name)
                .ok_or_else(|| PackageError::UnknownPlugin {
                    package: package.clone(),
                    plugin: plugin_name.clone(),
                })?;

        tracing::debug!(
            package = %package,
            plugin = %plugin_name,
            phase = %context.phase,
            stage = %context.stage,
            "running action item"
        );

        let (sender, receiver) = crossbeam_channel::bounded(1);
        let item = item.clone();
        thread::Builder::new()
            .name(format!("lime-{}", plugin_name))
            .spawn(move || {
                let _ = sender.send(plugin.run(&item, &context));
            })?;

        match receiver.recv_timeout(self.settings.trigger_timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                tracing::warn!(package = %package, plugin = %plugin_name, error = %source, "action item failed");
                Err(PackageError::Plugin {
                    plugin: plugin_name,
                    source,
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    package = %package,
                    plugin = %plugin_name,
                    timeout = ?self.settings.trigger_timeout,
                    "action item timed out"
                );
                Err(PackageError::TriggerTimeout {
                    package,
                    plugin: plugin_name,
                    timeout: self.settings.trigger_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(PackageError::Plugin {
                plugin: plugin_name,
                source: PluginError::Failed("worker exited without a result".to_string()),
            }),
        }
    }

    /// Write every payload in order, recording progress in the status
    /// database; the first failure becomes a PartialFailure
    fn write_files(&self, manifest: &Manifest, payloads: &[(&File, Vec<u8>)]) -> Result<Vec<String>> {
        let name = manifest.name.as_str();
        let mut written = Vec::with_capacity(payloads.len());

        for (file, data) in payloads {
            if let Err(err) = self.write_file(file, data) {
                tracing::warn!(package = name, path = %file.path, error = %err, "file write failed");
                self.update(name, |record| record.written_files = written.clone());
                return Err(PackageError::PartialFailure {
                    package: name.to_string(),
                    completed: written,
                    failed: file.path.clone(),
                    reason: err.to_string(),
                });
            }
            tracing::debug!(package = name, path = %file.path, size = data.len(), "wrote file");
            written.push(file.path.clone());
        }

        self.update(name, |record| record.written_files = written.clone());
        Ok(written)
    }

    fn write_file(&self, file: &File, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = parent_dir(&file.path) {
            self.filesystem.mkdir_all(parent)?;
        }
        self.filesystem.write_file(&file.path, data, file.mode)?;
        if !file.user.is_empty() || !file.group.is_empty() {
            self.filesystem.chown(&file.path, &file.user, &file.group)?;
        }
        Ok(())
    }

    /// Delete files, skipping ones already gone
    ///
    /// Deleted paths leave the record's written files even when a later
    /// deletion fails with PartialFailure.
    fn remove_files<'f>(
        &self,
        package: &str,
        files: impl IntoIterator<Item = &'f File>,
    ) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for file in files {
            match self.filesystem.remove(&file.path) {
                Ok(()) => {
                    tracing::debug!(package, path = %file.path, "removed file");
                    removed.push(file.path.clone());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(package, path = %file.path, "file already absent");
                }
                Err(err) => {
                    tracing::warn!(package, path = %file.path, error = %err, "file removal failed");
                    self.forget_files(package, &removed);
                    return Err(PackageError::PartialFailure {
                        package: package.to_string(),
                        completed: removed,
                        failed: file.path.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        self.forget_files(package, &removed);
        Ok(removed)
    }

    fn forget_files(&self, package: &str, removed: &[String]) {
        self.update(package, |record| {
            record.written_files.retain(|path| !removed.contains(path))
        });
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("filesystem", &self.filesystem.backend_name())
            .field("plugins", &self.plugins)
            .field("certificates", &self.certificates.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Read and verify every declared payload before anything runs
fn read_payloads(source: &dyn PackageSource) -> Result<Vec<(&File, Vec<u8>)>> {
    let files = &source.manifest().files;
    let mut payloads = Vec::with_capacity(files.len());
    for file in files {
        payloads.push((file, source.read_file(&file.path)?));
    }
    Ok(payloads)
}

/// Batch members ordered so dependents come before what they depend on
fn removal_order(records: &[PackageRecord]) -> Result<Vec<String>> {
    let mut order = InstallOrderComputer::new();
    for record in records {
        order.add_package(record.name());
        for dep in record.manifest.hard_dependencies() {
            for target in records
                .iter()
                .filter(|t| t.name() != record.name() && t.manifest.satisfies(dep))
            {
                order.add_dependency(record.name(), target.name());
            }
        }
    }
    order.removal_order()
}

fn stage_items(action: &Action, stage: Stage) -> &[ActionItem] {
    match stage {
        Stage::Before => &action.before,
        Stage::After => &action.after,
    }
}

/// Files a remove deletes: neither common nor configuration
fn unpacked_files(manifest: &Manifest) -> impl Iterator<Item = &File> {
    manifest
        .files
        .iter()
        .filter(|f| !f.is_common && !f.is_configuration())
}

fn is_removable(state: PackageState) -> bool {
    state == PackageState::Installed || state.is_transient()
}

fn package_names(manifests: &[Manifest]) -> Vec<String> {
    manifests.iter().map(|m| m.name.to_string()).collect()
}

fn invalid_state(package: &str, state: PackageState, operation: &str) -> PackageError {
    PackageError::InvalidState {
        package: package.to_string(),
        state,
        operation: operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{PackageArchive, PackageBuilder};
    use crate::manifest::{FileType, PackageName};
    use crate::provider::MemoryFileSystem;
    use crate::version::Version;

    fn archive(manifest: Manifest, files: &[(&str, &[u8])]) -> PackageArchive<std::io::Cursor<Vec<u8>>> {
        let mut builder = PackageBuilder::new(manifest);
        for (path, contents) in files {
            builder = builder.file(*path, contents.to_vec());
        }
        PackageArchive::from_bytes(builder.build().unwrap()).unwrap()
    }

    fn engine() -> (Engine, MemoryFileSystem) {
        let fs = MemoryFileSystem::new();
        (Engine::new(Arc::new(fs.clone()), PluginRegistry::new()), fs)
    }

    #[test]
    fn test_install_then_remove_keeps_config() {
        let (engine, fs) = engine();
        let manifest = Manifest::new(PackageName::new("app").unwrap(), Version::new(1, 0, 0))
            .with_file(File::for_contents("/usr/bin/app", b"bin").with_type(FileType::Executable))
            .with_file(File::for_contents("/etc/app.conf", b"conf").with_type(FileType::Configuration));
        let package = archive(
            manifest,
            &[("/usr/bin/app", b"bin"), ("/etc/app.conf", b"conf")],
        );

        let report = engine.install(&package).unwrap();
        assert_eq!(report.from, PackageState::NotInstalled);
        assert_eq!(report.to, PackageState::Installed);
        assert_eq!(fs.read_file("/usr/bin/app").unwrap(), b"bin");

        let report = engine.remove("app").unwrap();
        assert_eq!(report.files_removed, vec!["/usr/bin/app".to_string()]);
        assert!(fs.exists("/etc/app.conf"));
        assert_eq!(engine.state("app"), PackageState::Removed);

        let report = engine.purge("app").unwrap();
        assert_eq!(report.files_removed, vec!["/etc/app.conf".to_string()]);
        assert_eq!(engine.state("app"), PackageState::Purged);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.reconfigure("ghost"),
            Err(PackageError::PackageNotFound(_))
        ));

        let package = archive(
            Manifest::new(PackageName::new("app").unwrap(), Version::new(1, 0, 0)),
            &[],
        );
        engine.install(&package).unwrap();
        assert!(matches!(
            engine.install(&package),
            Err(PackageError::InvalidState { state: PackageState::Installed, .. })
        ));

        engine.remove("app").unwrap();
        assert!(matches!(
            engine.reconfigure("app"),
            Err(PackageError::InvalidState { state: PackageState::Removed, .. })
        ));
        assert!(matches!(
            engine.remove("app"),
            Err(PackageError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_stage_items() {
        let item = ActionItem::new(PackageName::new("p").unwrap(), serde_yaml::Value::Null);
        let action = Action::new(ActionType::Install).before(item.clone());
        assert_eq!(stage_items(&action, Stage::Before).len(), 1);
        assert!(stage_items(&action, Stage::After).is_empty());
    }
}
