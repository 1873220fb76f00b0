//! SHA-256 helpers. The whole protocol hashes with SHA-256: block hashes,
//! empty-block hashes, sortition priorities, seed chains.

use sha2::{Digest, Sha256};

/// Hash a single byte slice with SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of several byte slices without materialising it.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
