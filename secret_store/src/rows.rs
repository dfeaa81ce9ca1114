// SPDX-License-Identifier: MIT OR Apache-2.0
//! Row types for the collections and secrets tables.

use secrets_core::{AccessControlMode, UnlockSemantic};
use serde::{Deserialize, Serialize};

/// Metadata row for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRow {
    pub name: String,
    pub owner_application_id: String,
    pub uses_device_lock_key: bool,
    pub storage_plugin: String,
    pub encryption_plugin: String,
    pub authentication_plugin: String,
    pub unlock_semantic: UnlockSemantic,
    pub custom_lock_timeout_ms: u64,
    pub access_control_mode: AccessControlMode,
}

impl CollectionRow {
    /// Whether this collection is served by a fused encrypted-storage plugin.
    pub fn is_fused(&self) -> bool {
        self.storage_plugin == self.encryption_plugin
    }
}

/// Metadata row for a secret, keyed by (collection name, hashed secret name).
///
/// Standalone secrets carry their own lock metadata under the reserved
/// collection name; collection secrets inherit these fields from their
/// collection row at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRow {
    pub collection_name: String,
    pub hashed_secret_name: String,
    pub owner_application_id: String,
    pub uses_device_lock_key: bool,
    pub storage_plugin: String,
    pub encryption_plugin: String,
    pub authentication_plugin: String,
    pub unlock_semantic: UnlockSemantic,
    pub custom_lock_timeout_ms: u64,
    pub access_control_mode: AccessControlMode,
}

impl SecretRow {
    pub fn is_fused(&self) -> bool {
        self.storage_plugin == self.encryption_plugin
    }
}
