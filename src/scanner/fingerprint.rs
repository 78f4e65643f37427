//! Merkle-style content fingerprints.
//!
//! A directory's fingerprint is a SHA-256 over the sorted list of its
//! immediate-child tuples: files contribute a lightweight metadata hash of
//! (name, size, mtime); subdirectories contribute their own fingerprint.
//! Any change to any descendant therefore changes every ancestor's
//! fingerprint, which is what makes O(1) subtree comparison possible.
//!
//! Storage is a flat per-path table in the catalog, not a linked tree.

#![allow(missing_docs)]

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::core::errors::{Result, WardenError};

/// 32-byte SHA-256 digest used for all fingerprints.
pub type Fingerprint = [u8; 32];

/// Child entry kind, part of the hashed tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChildKind {
    File,
    Directory,
}

impl ChildKind {
    const fn tag(self) -> u8 {
        match self {
            Self::File => b'f',
            Self::Directory => b'd',
        }
    }
}

/// One immediate child's contribution to its parent's fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildTuple {
    pub name: String,
    pub kind: ChildKind,
    pub size_bytes: u64,
    /// Metadata hash for files, recursive fingerprint for directories.
    pub hash: Fingerprint,
}

/// Lightweight per-file hash over (name, size, mtime).
///
/// Cheap enough to compute for every file; full content hashing is reserved
/// for duplicate-detection candidates above the configured size threshold.
pub fn file_metadata_hash(name: &str, size_bytes: u64, modified: SystemTime) -> Fingerprint {
    let modified_nanos = modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(size_bytes.to_le_bytes());
    hasher.update(modified_nanos.to_le_bytes());
    hasher.finalize().into()
}

/// Compute a directory's fingerprint from its immediate children.
///
/// Children are sorted by (name, kind) internally, so the result is
/// independent of discovery order — workers may report children in any order.
pub fn directory_fingerprint(children: &[ChildTuple]) -> Fingerprint {
    let mut sorted: Vec<&ChildTuple> = children.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.kind.cmp(&b.kind)));

    let mut hasher = Sha256::new();
    for child in sorted {
        hasher.update(child.name.as_bytes());
        hasher.update([child.kind.tag()]);
        hasher.update(child.size_bytes.to_le_bytes());
        hasher.update(child.hash);
    }
    hasher.finalize().into()
}

/// Full streaming SHA-256 of a file's content, hex-encoded.
pub fn content_hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| WardenError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|e| WardenError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    let digest: Fingerprint = hasher.finalize().into();
    Ok(hash_hex(&digest))
}

/// Format a fingerprint as a lowercase hex string.
pub fn hash_hex(hash: &Fingerprint) -> String {
    use std::fmt::Write;
    hash.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Parse a 64-char hex string back into a fingerprint.
///
/// Catalog rows store fingerprints as hex; incremental scans need the raw
/// bytes to splice prior child fingerprints into a live parent computation.
pub fn parse_hex(raw: &str) -> Option<Fingerprint> {
    if raw.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(raw.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(out)
}
