//! Content hashing of mirrored tables.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the JSON form of `value`, as 64 lowercase hex characters.
///
/// Stored on parent rows so readers can tell whether a table's metadata
/// changed between harvests.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}
