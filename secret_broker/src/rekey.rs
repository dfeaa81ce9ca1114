// SPDX-License-Identifier: MIT OR Apache-2.0
//! Master lock change: re-key the bookkeeping store, then sweep every
//! device-lock-keyed collection and standalone secret onto the new device
//! lock key.
//!
//! The sweep is best-effort: a collection or secret that fails to re-encrypt
//! is logged and left stale-keyed, and a subsequent access fails with the
//! plugin's key-mismatch error. No rollback is attempted.

use secrets_core::{Result, SecretsError, STANDALONE_COLLECTION};
use secret_plugins::wrappers;
use tracing::warn;
use zeroize::Zeroizing;

use crate::processor::{PluginPair, RequestProcessor};

impl RequestProcessor {
    /// Re-key the bookkeeping database and everything keyed by the device
    /// lock. Invoked by `modify_lock_code` on the database target after both
    /// passphrase prompts complete.
    pub(crate) async fn modify_master_lock(
        &self,
        old_lock_code: &[u8],
        new_lock_code: &[u8],
    ) -> Result<()> {
        if !self.context.test_lock_code(old_lock_code) {
            return Err(SecretsError::DaemonLocked(
                "the given old lock code was incorrect".into(),
            ));
        }

        // Deep copies of the outgoing keys; the context rotates underneath.
        let old_bkdb_key = self.context.bkdb_lock_key();
        let old_device_key = self.context.device_lock_key();

        if !self.store.is_initialised() {
            self.store.initialise(&old_bkdb_key).map_err(|e| {
                SecretsError::Unknown(format!(
                    "unable to initialise the database using the old lock code: {e}"
                ))
            })?;
        }

        self.context.initialise(new_lock_code)?;
        let new_bkdb_key = self.context.bkdb_lock_key();

        if let Err(reencrypt_err) = self.store.reencrypt(&old_bkdb_key, &new_bkdb_key) {
            // Failed to re-encrypt; restore the outgoing key material.
            let _ = self.context.initialise(old_lock_code);
            return Err(reencrypt_err.into());
        }
        self.context.set_no_lock_code(new_lock_code.is_empty());

        let new_device_key = self.context.device_lock_key();
        self.reencrypt_device_locked_collections(&old_device_key, &new_device_key)
            .await;
        self.reencrypt_device_locked_standalone_secrets(&old_device_key, &new_device_key)
            .await;

        // Let the plugins refresh their own master key material.
        let registry = self.registry.clone();
        let old = old_device_key.clone();
        let new = new_device_key.clone();
        let failures = self
            .run_plugin(move || Ok(wrappers::modify_master_lock_plugins(&registry, &old, &new)))
            .await?;
        for (plugin, err) in failures {
            warn!(plugin = %plugin, error = %err, "plugin master lock modification failed");
        }

        Ok(())
    }

    async fn reencrypt_device_locked_collections(
        &self,
        old_device_key: &Zeroizing<Vec<u8>>,
        new_device_key: &Zeroizing<Vec<u8>>,
    ) {
        let names = match self.store.collection_names() {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "failed to list collections for re-encryption");
                return;
            },
        };

        for name in names {
            let row = match self.store.collection_metadata(&name) {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(err) => {
                    warn!(collection = %name, error = %err, "failed to retrieve metadata for re-encryption");
                    continue;
                },
            };
            if !row.uses_device_lock_key {
                continue;
            }
            let pair = match self.resolve_pair(&row.storage_plugin, &row.encryption_plugin) {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(collection = %name, error = %err, "invalid plugin in metadata for re-encryption");
                    continue;
                },
            };

            let result = match &pair {
                PluginPair::Fused(plugin) => {
                    let fused = plugin.clone();
                    let collection = name.clone();
                    let old = old_device_key.clone();
                    let new = new_device_key.clone();
                    self.run_plugin(move || {
                        fused.unlock_collection_and_reencrypt(&collection, &old, &new, true)
                    })
                    .await
                },
                PluginPair::Split(storage, encryption) => {
                    let storage = storage.clone();
                    let encryption = encryption.clone();
                    let collection = name.clone();
                    let old = old_device_key.clone();
                    let new = new_device_key.clone();
                    self.run_plugin(move || {
                        storage.reencrypt_secrets(
                            Some(&collection),
                            &[],
                            &old,
                            &new,
                            encryption.as_ref(),
                        )
                    })
                    .await
                },
            };

            match result {
                Ok(()) => {
                    // Cached unlock keys for split device-locked collections
                    // must follow the rotation or later reads would decrypt
                    // with the stale key.
                    if !pair.is_fused() && self.key_cache.contains_collection(&name) {
                        self.key_cache
                            .insert_collection_key(&name, new_device_key.clone());
                    }
                },
                Err(err) => {
                    warn!(collection = %name, error = %err, "failed to re-encrypt device-locked collection");
                },
            }
        }
    }

    async fn reencrypt_device_locked_standalone_secrets(
        &self,
        old_device_key: &Zeroizing<Vec<u8>>,
        new_device_key: &Zeroizing<Vec<u8>>,
    ) {
        let hashed_names = match self.store.hashed_secret_names(STANDALONE_COLLECTION) {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "failed to retrieve standalone secret names for re-encryption");
                return;
            },
        };

        for hashed in hashed_names {
            let row = match self.store.secret_metadata(STANDALONE_COLLECTION, &hashed) {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(err) => {
                    warn!(secret = %hashed, error = %err, "failed to retrieve standalone metadata for re-encryption");
                    continue;
                },
            };
            if !row.uses_device_lock_key {
                continue;
            }
            // Fused standalone records follow the plugin master-lock
            // broadcast instead; only their cached keys need the rotation.
            let pair = match self.resolve_pair(&row.storage_plugin, &row.encryption_plugin) {
                Ok(pair @ PluginPair::Split(_, _)) => pair,
                Ok(PluginPair::Fused(_)) => {
                    if self.key_cache.standalone_key(&hashed).is_some() {
                        self.key_cache
                            .insert_standalone_key(&hashed, new_device_key.clone());
                    }
                    continue;
                },
                Err(err) => {
                    warn!(secret = %hashed, error = %err, "invalid plugin in standalone metadata for re-encryption");
                    continue;
                },
            };

            let PluginPair::Split(storage, encryption) = &pair else {
                continue;
            };
            let storage = storage.clone();
            let encryption = encryption.clone();
            let target = hashed.clone();
            let old = old_device_key.clone();
            let new = new_device_key.clone();
            let result = self
                .run_plugin(move || {
                    storage.reencrypt_secrets(
                        None,
                        &[target],
                        &old,
                        &new,
                        encryption.as_ref(),
                    )
                })
                .await;

            match result {
                Ok(()) => {
                    if self.key_cache.standalone_key(&hashed).is_some() {
                        self.key_cache
                            .insert_standalone_key(&hashed, new_device_key.clone());
                    }
                },
                Err(err) => {
                    warn!(secret = %hashed, error = %err, "failed to re-encrypt device-locked standalone secret");
                },
            }
        }
    }
}
