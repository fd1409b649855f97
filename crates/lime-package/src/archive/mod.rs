//! Lime package archives
//!
//! # Layout
//!
//! ```text
//! +------------------------------+
//! | magic "LiMedPkg"  (8 bytes)  |
//! | manifest length   (u64 LE)   |
//! | manifest          (YAML)     |
//! | index length      (u64 LE)   |
//! | file index        (YAML)     |
//! +------------------------------+
//! | file region                  |
//! |  entry payloads, in manifest |
//! |  order, optionally DEFLATEd  |
//! +------------------------------+
//! ```
//!
//! Index offsets are relative to the start of the file region.

mod builder;
mod format;
mod reader;

pub use builder::PackageBuilder;
pub use format::{FileIndex, FileIndexEntry};
pub use reader::{EntryReader, PackageArchive};

use crate::manifest::Manifest;
use crate::names::{impl_named_enum, NamedEnum};
use crate::Result;
use sha2::{Digest, Sha256};

/// Magic bytes at the start of every package
pub const MAGIC: &[u8; 8] = b"LiMedPkg";

/// Lowercase hex sha256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compression applied to every entry of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Deflate,
}

impl NamedEnum for Compression {
    const KIND: &'static str = "compression";
    const NAMES: &'static [(Self, &'static str)] = &[
        (Compression::None, "none"),
        (Compression::Deflate, "deflate"),
    ];
    const EMPTY: Option<Self> = Some(Compression::None);
}

impl_named_enum!(Compression);

/// Anything the lifecycle engine can install from
pub trait PackageSource {
    fn manifest(&self) -> &Manifest;

    /// Full, verified contents of a file the manifest declares
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}
