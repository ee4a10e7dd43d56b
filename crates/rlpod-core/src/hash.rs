//! Content fingerprints for manifests

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{PodError, Result};

/// Fingerprint of raw manifest bytes: lowercase hex SHA-256.
///
/// Depends only on the bytes, never on where they were read from.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read a manifest once, returning its bytes and their fingerprint
pub fn read_manifest(path: impl AsRef<Path>) -> Result<(Vec<u8>, String)> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| PodError::Hash {
        path: path.to_path_buf(),
        source,
    })?;
    let hash = hash_bytes(&bytes);
    Ok((bytes, hash))
}
