//! Capability providers the lifecycle engine calls into
//!
//! Filesystem access, plugins and certificate issuance are all trait objects
//! chosen when the engine is constructed.

mod fs;
mod plugin;

pub use fs::{DiskFileSystem, MemoryFileSystem};
pub use plugin::{
    CertificatePlugin, FileGeneratorPlugin, PluginContext, PluginError, PluginKind,
    PluginRegistry, Stage, TransitionPlugin,
};

use std::io::{self, Read, Write};

/// Metadata of a file or directory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileStat {
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    pub is_dir: bool,
    pub user: String,
    pub group: String,
}

/// Filesystem packages are installed into
///
/// Paths are absolute package paths such as `/etc/app.conf`; backends map
/// them onto their own storage.
pub trait FileSystemProvider: Send + Sync {
    /// Open a file for reading
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Create or truncate a file for writing
    fn create(&self, path: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Write a whole file; a zero mode keeps the backend default
    fn write_file(&self, path: &str, data: &[u8], mode: u32) -> io::Result<()>;

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    fn stat(&self, path: &str) -> io::Result<FileStat>;

    fn chmod(&self, path: &str, mode: u32) -> io::Result<()>;

    fn chown(&self, path: &str, user: &str, group: &str) -> io::Result<()>;

    /// Create a directory and any missing parents
    fn mkdir_all(&self, path: &str) -> io::Result<()>;

    /// Remove a file or an empty directory
    fn remove(&self, path: &str) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Parent directory of a package path, if it has one
pub(crate) fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(index) => Some(&trimmed[..index]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/etc/app/app.conf"), Some("/etc/app"));
        assert_eq!(parent_dir("/etc/"), None);
        assert_eq!(parent_dir("/top"), None);
        assert_eq!(parent_dir("relative"), None);
    }
}
