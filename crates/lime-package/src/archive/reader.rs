//! Opening packages and reading entries lazily

use super::format::{read_header, FileIndex, FileIndexEntry};
use super::{sha256_hex, Compression, PackageSource};
use crate::manifest::Manifest;
use crate::{PackageError, Result};
use flate2::read::DeflateDecoder;
use parking_lot::Mutex;
use std::fs;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// An opened package archive
///
/// The underlying stream sits behind a mutex so entries of one archive can be
/// read from several threads at once.
#[derive(Debug)]
pub struct PackageArchive<R> {
    manifest: Manifest,
    index: FileIndex,
    files_start: u64,
    stream: Mutex<R>,
}

impl<R: Read + Seek> PackageArchive<R> {
    /// Read and verify the header; file payloads stay unread
    pub fn open(mut stream: R) -> Result<Self> {
        let header = read_header(&mut stream)?;

        tracing::debug!(
            package = %header.manifest.name,
            version = %header.manifest.version,
            files = header.index.files.len(),
            "opened package archive"
        );

        Ok(Self {
            manifest: header.manifest,
            index: header.index,
            files_start: header.files_start,
            stream: Mutex::new(stream),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// Lazy reader over one entry's uncompressed bytes
    pub fn entry(&self, path: &str) -> Result<EntryReader<'_, R>> {
        let entry = self
            .index
            .entry(path)
            .ok_or_else(|| PackageError::integrity(path, "not in package"))?;

        Ok(EntryReader {
            stream: &self.stream,
            start: self.files_start + entry.offset,
            entry: entry.clone(),
            compression: self.index.compression,
            body: None,
        })
    }

    /// Read an entry fully, checking its size and sha256
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let file = self
            .manifest
            .file(path)
            .ok_or_else(|| PackageError::integrity(path, "not in package"))?;
        let mut reader = self.entry(path)?;
        let size = reader.entry.size;

        // One byte past the declared size is enough to detect a longer payload
        let mut contents = Vec::new();
        (&mut reader)
            .take(size.saturating_add(1))
            .read_to_end(&mut contents)
            .map_err(|e| PackageError::integrity(path, format!("unreadable payload: {}", e)))?;

        if contents.len() as u64 != size {
            return Err(PackageError::integrity(
                path,
                format!("size mismatch: index {} payload {}", size, contents.len()),
            ));
        }

        let digest = sha256_hex(&contents);
        if digest != file.sha256 {
            return Err(PackageError::integrity(
                path,
                format!("sha256 mismatch: manifest {} payload {}", file.sha256, digest),
            ));
        }

        Ok(contents)
    }

    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }
}

impl PackageArchive<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::open(Cursor::new(bytes.into()))
    }
}

impl PackageArchive<BufReader<fs::File>> {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(BufReader::new(fs::File::open(path)?))
    }
}

impl<R: Read + Seek> PackageSource for PackageArchive<R> {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        PackageArchive::read_file(self, path)
    }
}

enum Body {
    Stored(Cursor<Vec<u8>>),
    Deflate(DeflateDecoder<Cursor<Vec<u8>>>),
}

/// Restartable reader for a single entry
///
/// Nothing is read from the archive until the first `read`; stored bytes are
/// fetched under the archive lock and decompressed afterwards.
pub struct EntryReader<'a, R> {
    stream: &'a Mutex<R>,
    start: u64,
    entry: FileIndexEntry,
    compression: Compression,
    body: Option<Body>,
}

impl<R: Read + Seek> EntryReader<'_, R> {
    pub fn entry(&self) -> &FileIndexEntry {
        &self.entry
    }

    /// Start over from the first byte
    pub fn rewind(&mut self) {
        self.body = None;
    }

    fn fetch(&self) -> io::Result<Body> {
        let length = usize::try_from(self.entry.compressed)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "entry too large"))?;
        let mut stored = vec![0u8; length];
        {
            let mut stream = self.stream.lock();
            stream.seek(SeekFrom::Start(self.start))?;
            stream.read_exact(&mut stored)?;
        }

        Ok(match self.compression {
            Compression::None => Body::Stored(Cursor::new(stored)),
            Compression::Deflate => Body::Deflate(DeflateDecoder::new(Cursor::new(stored))),
        })
    }
}

impl<R: Read + Seek> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.body.is_none() {
            self.body = Some(self.fetch()?);
        }
        match self.body.as_mut() {
            Some(Body::Stored(cursor)) => cursor.read(buf),
            Some(Body::Deflate(decoder)) => decoder.read(buf),
            None => Ok(0),
        }
    }
}

impl<R> std::fmt::Debug for EntryReader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("entry", &self.entry)
            .field("compression", &self.compression)
            .field("started", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::PackageBuilder;
    use crate::manifest::{File, PackageName};
    use crate::version::Version;

    fn archive(compression: Compression) -> PackageArchive<Cursor<Vec<u8>>> {
        let manifest = Manifest::new(PackageName::new("demo").unwrap(), Version::new(1, 0, 0))
            .with_file(File::for_contents("/etc/demo.conf", b"key = value\n"));
        let bytes = PackageBuilder::new(manifest)
            .compression(compression)
            .file("/etc/demo.conf", b"key = value\n".to_vec())
            .build()
            .unwrap();
        PackageArchive::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_entry_reader_rewind() {
        let archive = archive(Compression::Deflate);
        let mut reader = archive.entry("/etc/demo.conf").unwrap();

        let mut first = String::new();
        reader.read_to_string(&mut first).unwrap();
        reader.rewind();
        let mut second = String::new();
        reader.read_to_string(&mut second).unwrap();

        assert_eq!(first, "key = value\n");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_entry() {
        let archive = archive(Compression::None);
        assert!(matches!(
            archive.entry("/nope"),
            Err(PackageError::Integrity { .. })
        ));
        assert!(archive.read_file("/nope").is_err());
    }

    #[test]
    fn test_corrupted_payload_is_detected() {
        let archive = archive(Compression::None);
        let mut bytes = archive.into_inner().into_inner();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let archive = PackageArchive::from_bytes(bytes).unwrap();
        let err = archive.read_file("/etc/demo.conf").unwrap_err();
        assert!(matches!(err, PackageError::Integrity { path, .. } if path == "/etc/demo.conf"));
    }
}
