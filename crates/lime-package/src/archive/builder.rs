//! Package archive builder

use super::format::{write_header, FileIndex, FileIndexEntry};
use super::{sha256_hex, Compression};
use crate::manifest::Manifest;
use crate::settings::ArchiveSettings;
use crate::{PackageError, Result};
use flate2::write::DeflateEncoder;
use std::collections::HashMap;
use std::io::Write;

/// Assembles a manifest and file payloads into a package archive
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    manifest: Manifest,
    compression: Compression,
    level: u32,
    payloads: HashMap<String, Vec<u8>>,
}

impl PackageBuilder {
    pub fn new(manifest: Manifest) -> Self {
        let settings = ArchiveSettings::default();
        Self {
            manifest,
            compression: settings.compression,
            level: settings.level,
            payloads: HashMap::new(),
        }
    }

    /// Apply configured compression and level
    pub fn with_settings(mut self, settings: &ArchiveSettings) -> Self {
        self.compression = settings.compression;
        self.level = settings.level;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// DEFLATE level, 0-9
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Payload for a file declared in the manifest
    pub fn file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.payloads.insert(path.into(), contents.into());
        self
    }

    /// Build the archive in memory
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Write the archive, returning the number of bytes written
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        self.manifest.validate()?;
        self.check_payloads()?;

        let mut index = FileIndex {
            compression: self.compression,
            files: Vec::with_capacity(self.manifest.files.len()),
        };
        let mut region = Vec::new();

        for file in &self.manifest.files {
            let contents = self
                .payloads
                .get(&file.path)
                .ok_or_else(|| PackageError::integrity(&file.path, "no payload supplied"))?;
            let stored = self.compress(contents)?;

            index.files.push(FileIndexEntry {
                path: file.path.clone(),
                size: contents.len() as u64,
                compressed: stored.len() as u64,
                offset: region.len() as u64,
            });
            region.extend_from_slice(&stored);
        }

        let manifest = self.manifest.to_yaml()?;
        let index_yaml = serde_yaml::to_string(&index)?;

        write_header(writer, manifest.as_bytes(), index_yaml.as_bytes())?;
        writer.write_all(&region)?;

        let written = (super::MAGIC.len() + 16 + manifest.len() + index_yaml.len() + region.len()) as u64;
        tracing::debug!(
            package = %self.manifest.name,
            version = %self.manifest.version,
            files = index.files.len(),
            compression = %self.compression,
            bytes = written,
            "built package archive"
        );
        Ok(written)
    }

    /// Exactly one payload per manifest file, matching its hash
    fn check_payloads(&self) -> Result<()> {
        for file in &self.manifest.files {
            let contents = self
                .payloads
                .get(&file.path)
                .ok_or_else(|| PackageError::integrity(&file.path, "no payload supplied"))?;

            let digest = sha256_hex(contents);
            if digest != file.sha256 {
                return Err(PackageError::integrity(
                    &file.path,
                    format!("sha256 mismatch: manifest {} payload {}", file.sha256, digest),
                ));
            }
        }

        let mut undeclared: Vec<&String> = self
            .payloads
            .keys()
            .filter(|path| self.manifest.file(path).is_none())
            .collect();
        undeclared.sort();
        if let Some(path) = undeclared.first() {
            return Err(PackageError::integrity(
                path.as_str(),
                "payload not declared in manifest",
            ));
        }

        Ok(())
    }

    fn compress(&self, contents: &[u8]) -> Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(contents.to_vec()),
            Compression::Deflate => {
                let mut encoder =
                    DeflateEncoder::new(Vec::new(), flate2::Compression::new(self.level));
                encoder.write_all(contents)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{File, PackageName};
    use crate::version::Version;

    fn manifest() -> Manifest {
        Manifest::new(PackageName::new("demo").unwrap(), Version::new(0, 1, 0))
            .with_file(File::for_contents("/bin/demo", b"#!/bin/sh\n"))
    }

    #[test]
    fn test_build_starts_with_magic() {
        let bytes = PackageBuilder::new(manifest())
            .file("/bin/demo", b"#!/bin/sh\n".to_vec())
            .build()
            .unwrap();
        assert_eq!(&bytes[..8], b"LiMedPkg");

        let manifest_len = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;
        let yaml = std::str::from_utf8(&bytes[16..16 + manifest_len]).unwrap();
        assert!(yaml.contains("name: demo"));
    }

    #[test]
    fn test_write_to_reports_length() {
        let builder = PackageBuilder::new(manifest())
            .compression(Compression::Deflate)
            .file("/bin/demo", b"#!/bin/sh\n".to_vec());
        let mut out = Vec::new();
        let written = builder.write_to(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
    }

    #[test]
    fn test_missing_payload() {
        let err = PackageBuilder::new(manifest()).build().unwrap_err();
        assert!(matches!(err, PackageError::Integrity { path, .. } if path == "/bin/demo"));
    }

    #[test]
    fn test_hash_mismatch() {
        let err = PackageBuilder::new(manifest())
            .file("/bin/demo", b"tampered".to_vec())
            .build()
            .unwrap_err();
        assert!(matches!(err, PackageError::Integrity { path, .. } if path == "/bin/demo"));
    }

    #[test]
    fn test_undeclared_payload() {
        let err = PackageBuilder::new(manifest())
            .file("/bin/demo", b"#!/bin/sh\n".to_vec())
            .file("/extra", b"x".to_vec())
            .build()
            .unwrap_err();
        assert!(matches!(err, PackageError::Integrity { path, .. } if path == "/extra"));
    }
}
