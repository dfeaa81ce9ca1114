// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reserved names and the stable hashed-secret-name derivation.

use sha2::{Digest, Sha256};

/// The reserved collection name under which standalone secrets are indexed.
pub const STANDALONE_COLLECTION: &str = "standalone";

/// Whether the given collection name is reserved (case-insensitive).
pub fn is_reserved_collection_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(STANDALONE_COLLECTION)
}

/// Derive the stable bookkeeping key for a secret.
///
/// Length-prefixing both parts keeps ("ab","c") and ("a","bc") distinct.
/// The result is stable across restarts and lock-code changes.
pub fn hashed_secret_name(collection_name: &str, secret_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((collection_name.len() as u64).to_le_bytes());
    hasher.update(collection_name.as_bytes());
    hasher.update((secret_name.len() as u64).to_le_bytes());
    hasher.update(secret_name.as_bytes());
    hex::encode(hasher.finalize())
}
