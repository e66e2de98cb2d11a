//! Checksum utilities for stored artifacts

use crate::error::{HarvestError, Result};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a byte slice
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that `data` hashes to `expected`
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = compute_sha256(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(HarvestError::Storage(format!(
            "checksum mismatch: expected {}, got {}",
            expected, actual
        )))
    }
}
