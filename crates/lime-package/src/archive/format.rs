//! Header sections and the file index

use super::{Compression, MAGIC};
use crate::manifest::Manifest;
use crate::{PackageError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, SeekFrom, Write};

const LENGTH_SIZE: u64 = 8;

/// Location of one file inside the file region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub path: String,
    /// Uncompressed size
    pub size: u64,
    /// Stored size
    pub compressed: u64,
    /// Relative to the start of the file region
    pub offset: u64,
}

impl FileIndexEntry {
    fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.compressed)
    }
}

/// Index of every payload, one entry per manifest file in manifest order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileIndex {
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub files: Vec<FileIndexEntry>,
}

impl FileIndex {
    pub fn entry(&self, path: &str) -> Option<&FileIndexEntry> {
        self.files.iter().find(|e| e.path == path)
    }

    /// Total bytes of the file region the entries cover
    pub fn region_len(&self) -> u64 {
        self.files.iter().map(|e| e.compressed).sum()
    }

    /// Check the index against the manifest and the file region size
    pub fn verify(&self, manifest: &Manifest, region_len: u64) -> Result<()> {
        if self.files.len() != manifest.files.len() {
            return Err(PackageError::integrity(
                "index",
                format!(
                    "index/manifest mismatch: {} entries for {} files",
                    self.files.len(),
                    manifest.files.len()
                ),
            ));
        }

        let mut previous_end = 0u64;
        for (entry, file) in self.files.iter().zip(&manifest.files) {
            if entry.path != file.path {
                return Err(PackageError::integrity(
                    &entry.path,
                    format!("index/manifest mismatch: expected '{}'", file.path),
                ));
            }

            let section = format!("index entry '{}'", entry.path);
            let end = entry
                .end()
                .filter(|end| *end <= region_len)
                .ok_or_else(|| PackageError::format(&section, "outside the file region"))?;

            if entry.offset < previous_end {
                return Err(PackageError::format(&section, "overlaps previous entry"));
            }
            if self.compression == Compression::None && entry.compressed != entry.size {
                return Err(PackageError::format(
                    &section,
                    "stored size differs from size without compression",
                ));
            }

            previous_end = end;
        }

        Ok(())
    }
}

/// Parsed archive header
#[derive(Debug)]
pub(crate) struct Header {
    pub manifest: Manifest,
    pub index: FileIndex,
    /// Absolute stream position of the file region
    pub files_start: u64,
}

pub(crate) fn write_header<W: Write>(
    writer: &mut W,
    manifest: &[u8],
    index: &[u8],
) -> std::io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&(manifest.len() as u64).to_le_bytes())?;
    writer.write_all(manifest)?;
    writer.write_all(&(index.len() as u64).to_le_bytes())?;
    writer.write_all(index)?;
    Ok(())
}

/// Read and check everything up to the file region
pub(crate) fn read_header<R: Read + Seek>(reader: &mut R) -> Result<Header> {
    let total = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    if total < MAGIC.len() as u64 {
        return Err(PackageError::format("magic", "not a package"));
    }
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(PackageError::format("magic", "not a package"));
    }

    let manifest_bytes = read_section(reader, total, "manifest")?;
    let index_bytes = read_section(reader, total, "index")?;
    let files_start = reader.stream_position()?;

    let manifest: Manifest = parse_section(&manifest_bytes, "manifest")?;
    manifest.validate()?;
    let index: FileIndex = parse_section(&index_bytes, "index")?;
    index.verify(&manifest, total - files_start)?;

    Ok(Header {
        manifest,
        index,
        files_start,
    })
}

/// Read one length-prefixed section, checking the length before allocating
fn read_section<R: Read + Seek>(reader: &mut R, total: u64, section: &str) -> Result<Vec<u8>> {
    let position = reader.stream_position()?;
    let remaining = total.saturating_sub(position);
    if remaining < LENGTH_SIZE {
        return Err(PackageError::format(section, "truncated header"));
    }

    let mut length = [0u8; 8];
    reader.read_exact(&mut length)?;
    let length = u64::from_le_bytes(length);
    if length > remaining - LENGTH_SIZE {
        return Err(PackageError::format(section, "truncated header"));
    }

    let length = usize::try_from(length)
        .map_err(|_| PackageError::format(section, "section too large"))?;
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn parse_section<T: serde::de::DeserializeOwned>(bytes: &[u8], section: &str) -> Result<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PackageError::format(section, format!("not UTF-8: {}", e)))?;
    serde_yaml::from_str(text).map_err(|e| PackageError::format(section, e.to_string()))
}
