// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composition helpers pairing split storage and encryption plugins, and
//! registry-wide lock operations.
//!
//! These are the functions the request processor submits to its worker pool;
//! each performs blocking plugin work end to end so the dispatch task never
//! touches plugin I/O.

use secrets_core::{
    FilterData, FilterOperator, Result, Secret, SecretIdentifier, SecretsError,
};
use zeroize::Zeroizing;

use crate::registry::PluginRegistry;
use crate::traits::{EncryptedRecord, EncryptionPlugin, StoragePlugin};

/// Derive a collection unlock key from an authentication code.
pub fn derive_key_from_code(
    encryption: &dyn EncryptionPlugin,
    authentication_code: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    encryption.derive_key_from_code(authentication_code, salt)
}

/// Encrypt a secret's name and payload, then hand the record to storage.
pub fn encrypt_and_store_secret(
    encryption: &dyn EncryptionPlugin,
    storage: &dyn StoragePlugin,
    collection_name: &str,
    secret: &Secret,
    hashed_secret_name: &str,
    key: &[u8],
) -> Result<()> {
    let record = EncryptedRecord {
        name_ciphertext: encryption.encrypt(secret.identifier.name.as_bytes(), key)?,
        data_ciphertext: encryption.encrypt(&secret.data, key)?,
        filter_data: secret.filter_data.clone(),
    };
    storage.set_secret(collection_name, hashed_secret_name, record)
}

/// Fetch a record from storage and decrypt it back into a secret.
pub fn get_and_decrypt_secret(
    encryption: &dyn EncryptionPlugin,
    storage: &dyn StoragePlugin,
    collection_name: &str,
    hashed_secret_name: &str,
    key: &[u8],
) -> Result<Secret> {
    let record = storage.get_secret(collection_name, hashed_secret_name)?;
    let name_bytes = encryption.decrypt(&record.name_ciphertext, key)?;
    let name = String::from_utf8(name_bytes)
        .map_err(|_| SecretsError::Failed("stored secret name is not valid UTF-8".into()))?;
    let data = encryption.decrypt(&record.data_ciphertext, key)?;
    Ok(Secret {
        identifier: SecretIdentifier::new(name, collection_name),
        data,
        filter_data: record.filter_data,
    })
}

/// Run a filter query against storage and decrypt the matching names.
pub fn find_and_decrypt_secret_names(
    encryption: &dyn EncryptionPlugin,
    storage: &dyn StoragePlugin,
    collection_name: &str,
    filter: &FilterData,
    operator: FilterOperator,
    key: &[u8],
) -> Result<Vec<SecretIdentifier>> {
    let matches = storage.find_secrets(collection_name, filter, operator)?;
    let mut identifiers = Vec::with_capacity(matches.len());
    for (_, name_ciphertext) in matches {
        let name_bytes = encryption.decrypt(&name_ciphertext, key)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|_| SecretsError::Failed("stored secret name is not valid UTF-8".into()))?;
        identifiers.push(SecretIdentifier::new(name, collection_name));
    }
    Ok(identifiers)
}

/// Set the lock code on the named storage / encryption / encrypted-storage
/// plugin. `None` means no plugin of those capabilities carries the name.
pub fn modify_lock_specific_plugin(
    registry: &PluginRegistry,
    target: &str,
    old_lock_code: &[u8],
    new_lock_code: &[u8],
) -> Option<Result<()>> {
    if let Some(plugin) = registry.storage(target) {
        return Some(check_supports_locking(plugin.supports_locking(), target).and_then(|()| {
            plugin.set_lock_code(old_lock_code, new_lock_code)
        }));
    }
    if let Some(plugin) = registry.encryption(target) {
        return Some(check_supports_locking(plugin.supports_locking(), target).and_then(|()| {
            plugin.set_lock_code(old_lock_code, new_lock_code)
        }));
    }
    if let Some(plugin) = registry.encrypted_storage(target) {
        return Some(check_supports_locking(plugin.supports_locking(), target).and_then(|()| {
            plugin.set_lock_code(old_lock_code, new_lock_code)
        }));
    }
    None
}

/// Unlock the named plugin with the given lock code.
pub fn unlock_specific_plugin(
    registry: &PluginRegistry,
    target: &str,
    lock_code: &[u8],
) -> Option<Result<()>> {
    if let Some(plugin) = registry.storage(target) {
        return Some(
            check_supports_locking(plugin.supports_locking(), target)
                .and_then(|()| plugin.unlock(lock_code)),
        );
    }
    if let Some(plugin) = registry.encryption(target) {
        return Some(
            check_supports_locking(plugin.supports_locking(), target)
                .and_then(|()| plugin.unlock(lock_code)),
        );
    }
    if let Some(plugin) = registry.encrypted_storage(target) {
        return Some(
            check_supports_locking(plugin.supports_locking(), target)
                .and_then(|()| plugin.unlock(lock_code)),
        );
    }
    None
}

/// Lock the named plugin.
pub fn lock_specific_plugin(registry: &PluginRegistry, target: &str) -> Option<Result<()>> {
    if let Some(plugin) = registry.storage(target) {
        return Some(
            check_supports_locking(plugin.supports_locking(), target).and_then(|()| plugin.lock()),
        );
    }
    if let Some(plugin) = registry.encryption(target) {
        return Some(
            check_supports_locking(plugin.supports_locking(), target).and_then(|()| plugin.lock()),
        );
    }
    if let Some(plugin) = registry.encrypted_storage(target) {
        return Some(
            check_supports_locking(plugin.supports_locking(), target).and_then(|()| plugin.lock()),
        );
    }
    None
}

fn check_supports_locking(supported: bool, target: &str) -> Result<()> {
    if supported {
        Ok(())
    } else {
        Err(SecretsError::NotSupported(format!(
            "plugin {target} does not support locking"
        )))
    }
}

/// Tell every storage and encrypted-storage plugin that the device lock key
/// rotated. Failures are collected, not fatal.
pub fn modify_master_lock_plugins(
    registry: &PluginRegistry,
    old_device_lock_key: &[u8],
    new_device_lock_key: &[u8],
) -> Vec<(String, SecretsError)> {
    let mut failures = Vec::new();
    for plugin in registry.all_storage() {
        if let Err(err) = plugin.modify_master_lock(old_device_lock_key, new_device_lock_key) {
            failures.push((plugin.name().to_string(), err));
        }
    }
    for plugin in registry.all_encrypted_storage() {
        if let Err(err) = plugin.modify_master_lock(old_device_lock_key, new_device_lock_key) {
            failures.push((plugin.name().to_string(), err));
        }
    }
    failures
}

/// Offer the device lock key to every storage and encrypted-storage plugin
/// so they can unlock their master material.
pub fn master_unlock_plugins(
    registry: &PluginRegistry,
    device_lock_key: &[u8],
) -> Vec<(String, SecretsError)> {
    let mut failures = Vec::new();
    for plugin in registry.all_storage() {
        if let Err(err) = plugin.master_unlock(device_lock_key) {
            failures.push((plugin.name().to_string(), err));
        }
    }
    for plugin in registry.all_encrypted_storage() {
        if let Err(err) = plugin.master_unlock(device_lock_key) {
            failures.push((plugin.name().to_string(), err));
        }
    }
    failures
}

/// Seal every storage and encrypted-storage plugin's master material.
pub fn master_lock_plugins(registry: &PluginRegistry) -> Vec<(String, SecretsError)> {
    let mut failures = Vec::new();
    for plugin in registry.all_storage() {
        if let Err(err) = plugin.master_lock() {
            failures.push((plugin.name().to_string(), err));
        }
    }
    for plugin in registry.all_encrypted_storage() {
        if let Err(err) = plugin.master_lock() {
            failures.push((plugin.name().to_string(), err));
        }
    }
    failures
}
