//! Content hashing and corpus fingerprinting.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use acadbot_core::{Error, Result};

/// Hash recorded for a corpus file whose bytes cannot be read.
pub const UNREADABLE_HASH: &str = "unreadable";

/// Compute SHA-256 content hash.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file's bytes.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::load(path, e.to_string()))?;
    Ok(content_hash(&bytes))
}

/// Identity of a set of corpus files: SHA-256 over sorted (file name, content hash) pairs.
///
/// Renaming or editing any file, or adding/removing one, changes the fingerprint.
/// Unreadable files contribute [`UNREADABLE_HASH`]; loading reports them.
pub fn corpus_fingerprint(paths: &[PathBuf]) -> String {
    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hash = file_hash(path).unwrap_or_else(|e| {
            warn!("Fingerprinting {} as unreadable: {}", path.display(), e);
            UNREADABLE_HASH.to_string()
        });
        entries.push((name, hash));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, hash) in &entries {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}
