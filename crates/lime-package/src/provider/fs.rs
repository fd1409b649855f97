//! In-memory and on-disk filesystem backends

use super::{FileStat, FileSystemProvider};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        mode: u32,
        user: String,
        group: String,
    },
    Dir {
        mode: u32,
    },
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}: no such file or directory", path))
}

/// `/a//b/` -> `/a/b`
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(index) => Some(&path[..index]),
    }
}

/// Filesystem held entirely in memory
///
/// Clones share the same tree.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    nodes: Arc<RwLock<BTreeMap<String, Node>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mode: DEFAULT_DIR_MODE });
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Paths of every regular file, sorted
    pub fn files(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn store(&self, path: &str, data: Vec<u8>, mode: Option<u32>) -> io::Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.write();

        match parent_of(&path).map(|parent| nodes.get(parent)) {
            Some(Some(Node::Dir { .. })) => {}
            Some(Some(Node::File { .. })) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: parent is not a directory", path),
                ))
            }
            _ => return Err(not_found(&path)),
        }

        match nodes.get_mut(&path) {
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path),
            )),
            Some(Node::File {
                data: existing,
                mode: existing_mode,
                ..
            }) => {
                *existing = data;
                if let Some(mode) = mode {
                    *existing_mode = mode;
                }
                Ok(())
            }
            None => {
                nodes.insert(
                    path,
                    Node::File {
                        data,
                        mode: mode.unwrap_or(DEFAULT_FILE_MODE),
                        user: String::new(),
                        group: String::new(),
                    },
                );
                Ok(())
            }
        }
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers writes and stores them on flush and drop
struct MemoryWriter {
    fs: MemoryFileSystem,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.fs.store(&self.path, self.buffer.clone(), None)
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path, error = %e, "dropping unwritten in-memory file");
        }
    }
}

impl FileSystemProvider for MemoryFileSystem {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read_file(path)?)))
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        self.store(path, Vec::new(), None)?;
        Ok(Box::new(MemoryWriter {
            fs: self.clone(),
            path: normalize(path),
            buffer: Vec::new(),
        }))
    }

    fn write_file(&self, path: &str, data: &[u8], mode: u32) -> io::Result<()> {
        let mode = if mode == 0 { None } else { Some(mode) };
        self.store(path, data.to_vec(), mode)
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        match self.nodes.read().get(&normalize(path)) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path),
            )),
            None => Err(not_found(path)),
        }
    }

    fn stat(&self, path: &str) -> io::Result<FileStat> {
        match self.nodes.read().get(&normalize(path)) {
            Some(Node::File {
                data,
                mode,
                user,
                group,
            }) => Ok(FileStat {
                size: data.len() as u64,
                mode: *mode,
                is_dir: false,
                user: user.clone(),
                group: group.clone(),
            }),
            Some(Node::Dir { mode }) => Ok(FileStat {
                mode: *mode,
                is_dir: true,
                ..FileStat::default()
            }),
            None => Err(not_found(path)),
        }
    }

    fn chmod(&self, path: &str, mode: u32) -> io::Result<()> {
        match self.nodes.write().get_mut(&normalize(path)) {
            Some(Node::File { mode: current, .. }) | Some(Node::Dir { mode: current }) => {
                *current = mode;
                Ok(())
            }
            None => Err(not_found(path)),
        }
    }

    fn chown(&self, path: &str, user: &str, group: &str) -> io::Result<()> {
        match self.nodes.write().get_mut(&normalize(path)) {
            Some(Node::File {
                user: u, group: g, ..
            }) => {
                *u = user.to_string();
                *g = group.to_string();
                Ok(())
            }
            Some(Node::Dir { .. }) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.write();
        let mut current = String::new();

        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            match nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{}: file exists", current),
                    ))
                }
                None => {
                    nodes.insert(current.clone(), Node::Dir { mode: DEFAULT_DIR_MODE });
                }
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.write();

        if let Some(Node::Dir { .. }) = nodes.get(&path) {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            if nodes.keys().any(|key| key.starts_with(&prefix)) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: directory not empty", path),
                ));
            }
        }

        nodes.remove(&path).map(|_| ()).ok_or_else(|| not_found(&path))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut nodes = self.nodes.write();

        if parent_of(&to).map_or(true, |parent| !matches!(nodes.get(parent), Some(Node::Dir { .. }))) {
            return Err(not_found(&to));
        }

        let node = nodes.remove(&from).ok_or_else(|| not_found(&from))?;
        let prefix = format!("{}/", from);
        let children: Vec<String> = nodes
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        for child in children {
            if let Some(moved) = nodes.remove(&child) {
                nodes.insert(format!("{}{}", to, &child[from.len()..]), moved);
            }
        }
        nodes.insert(to, node);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Filesystem rooted at a host directory
#[derive(Debug, Clone)]
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a package path; `..` may not escape the root
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{}: path escapes the filesystem root", path),
                    ))
                }
            }
        }
        Ok(resolved)
    }
}

impl FileSystemProvider for DiskFileSystem {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(self.resolve(path)?)?))
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(std::fs::File::create(self.resolve(path)?)?))
    }

    fn write_file(&self, path: &str, data: &[u8], mode: u32) -> io::Result<()> {
        let target = self.resolve(path)?;
        std::fs::write(&target, data)?;
        if mode != 0 {
            self.chmod(path, mode)?;
        }
        Ok(())
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path)?)
    }

    fn stat(&self, path: &str) -> io::Result<FileStat> {
        let meta = std::fs::metadata(self.resolve(path)?)?;

        #[cfg(unix)]
        let (mode, user, group) = {
            use std::os::unix::fs::MetadataExt;
            (meta.mode() & 0o7777, meta.uid().to_string(), meta.gid().to_string())
        };
        #[cfg(not(unix))]
        let (mode, user, group) = (0, String::new(), String::new());

        Ok(FileStat {
            size: meta.len(),
            mode,
            is_dir: meta.is_dir(),
            user,
            group,
        })
    }

    fn chmod(&self, path: &str, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(self.resolve(path)?, std::fs::Permissions::from_mode(mode))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Ok(())
        }
    }

    fn chown(&self, path: &str, user: &str, group: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        let uid = user.parse::<u32>().ok();
        let gid = group.parse::<u32>().ok();

        if (uid.is_none() && !user.is_empty()) || (gid.is_none() && !group.is_empty()) {
            tracing::warn!(path, user, group, "owner names are not resolved; skipping");
        }
        if uid.is_none() && gid.is_none() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            std::os::unix::fs::chown(target, uid, gid)
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            Ok(())
        }
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        std::fs::create_dir_all(self.resolve(path)?)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if std::fs::symlink_metadata(&target)?.is_dir() {
            std::fs::remove_dir(target)
        } else {
            std::fs::remove_file(target)
        }
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        std::fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}
