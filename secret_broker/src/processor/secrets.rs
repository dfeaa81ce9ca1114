// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-secret operations inside a collection, plus the bookkeeping-only
//! metadata helpers used by the crypto sibling.

use secrets_core::{
    hashed_secret_name, FilterData, FilterOperator, InteractionOperation, InteractionParameters,
    Result, Secret, SecretIdentifier, SecretsError, UserInteractionMode,
};
use secret_plugins::wrappers;
use secret_store::{CollectionRow, SecretRow};
use tracing::warn;

use crate::pending::PendingKind;

use super::{PluginPair, RequestProcessor};

fn secret_row_from_collection(row: &CollectionRow, hashed: &str) -> SecretRow {
    SecretRow {
        collection_name: row.name.clone(),
        hashed_secret_name: hashed.to_string(),
        owner_application_id: row.owner_application_id.clone(),
        uses_device_lock_key: row.uses_device_lock_key,
        storage_plugin: row.storage_plugin.clone(),
        encryption_plugin: row.encryption_plugin.clone(),
        authentication_plugin: row.authentication_plugin.clone(),
        unlock_semantic: row.unlock_semantic,
        custom_lock_timeout_ms: row.custom_lock_timeout_ms,
        access_control_mode: row.access_control_mode,
    }
}

impl RequestProcessor {
    fn collection_row_checked(
        &self,
        collection_name: &str,
        caller_application_id: &str,
    ) -> Result<CollectionRow> {
        let Some(row) = self.store.collection_metadata(collection_name)? else {
            return Err(SecretsError::InvalidCollection(
                "nonexistent collection name given".into(),
            ));
        };
        Self::check_access_control(
            row.access_control_mode,
            &row.owner_application_id,
            caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        Ok(row)
    }

    /// Store a secret inside a collection. If interaction parameters are
    /// supplied, the secret bytes themselves are collected from the user
    /// first; a separate prompt may then be needed for the unlock
    /// passphrase.
    pub async fn set_collection_secret(
        &self,
        caller_pid: u32,
        request_id: u64,
        mut secret: Secret,
        ui_params: Option<InteractionParameters>,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        Self::validate_secret_name(&secret.identifier.name)?;
        Self::validate_collection_name(&secret.identifier.collection_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);
        let collection_name = secret.identifier.collection_name.clone();

        let row = self.collection_row_checked(&collection_name, &caller_application_id)?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;

        // Collect the secret bytes from the user when asked to.
        if let Some(ui_params) = ui_params {
            let input_plugin =
                self.resolve_user_input_plugin(&ui_params.authentication_plugin_name)?;
            let mut params = ui_params;
            params.application_id = caller_application_id.clone();
            params.collection_name = collection_name.clone();
            params.secret_name = secret.identifier.name.clone();
            params.operation = InteractionOperation::RequestUserData;
            params.prompt_text = format!(
                "Enter confidential data for secret {} in collection {} stored by plugin {}",
                secret.identifier.name, collection_name, row.storage_plugin
            );
            secret.data = self
                .request_user_input(
                    caller_pid,
                    request_id,
                    PendingKind::SetCollectionUserInputSecret,
                    &input_plugin,
                    params,
                    interaction_service_address,
                )
                .await?;
        }

        let key = self
            .acquire_collection_key(
                caller_pid,
                request_id,
                &row,
                &pair,
                InteractionOperation::StoreSecret,
                PendingKind::SetCollectionSecret,
                &secret.identifier.name,
                format!(
                    "Enter the passphrase to unlock the collection {} in order to store secret {}",
                    collection_name, secret.identifier.name
                ),
                user_interaction_mode,
                interaction_service_address,
            )
            .await?;

        let _guard = self.interleave.try_acquire(&collection_name)?;

        let hashed = hashed_secret_name(&collection_name, &secret.identifier.name);
        let secret_already_exists = self.store.secret_already_exists(&collection_name, &hashed)?;
        if !secret_already_exists {
            // The bookkeeping row is written before the storage plugin.
            self.store
                .insert_secret(secret_row_from_collection(&row, &hashed))?;
        }

        let plugin_result = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let secret = secret.clone();
                let hashed = hashed.clone();
                let key = key.clone();
                self.run_plugin(move || {
                    fused.unlock_collection_and_store_secret(&secret, &hashed, &key)
                })
                .await
            },
            PluginPair::Split(storage, encryption) => {
                let storage = storage.clone();
                let encryption = encryption.clone();
                let collection = collection_name.clone();
                let secret = secret.clone();
                let hashed = hashed.clone();
                let key = key.clone();
                self.run_plugin(move || {
                    wrappers::encrypt_and_store_secret(
                        encryption.as_ref(),
                        storage.as_ref(),
                        &collection,
                        &secret,
                        &hashed,
                        &key,
                    )
                })
                .await
            },
        };

        match plugin_result {
            Ok(()) => Ok(()),
            Err(plugin_err) if !secret_already_exists => {
                // New row: compensate. Existing rows are left intact.
                Err(self
                    .store
                    .cleanup_delete_secret(&collection_name, &hashed, plugin_err))
            },
            Err(plugin_err) => Err(plugin_err),
        }
    }

    /// Read a secret from a collection.
    pub async fn get_collection_secret(
        &self,
        caller_pid: u32,
        request_id: u64,
        identifier: SecretIdentifier,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<Secret> {
        Self::validate_secret_name(&identifier.name)?;
        Self::validate_collection_name(&identifier.collection_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        let row = self.collection_row_checked(&identifier.collection_name, &caller_application_id)?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;
        self.authentication_plugin(&row.authentication_plugin)?;

        let key = self
            .acquire_collection_key(
                caller_pid,
                request_id,
                &row,
                &pair,
                InteractionOperation::ReadSecret,
                PendingKind::GetCollectionSecret,
                &identifier.name,
                format!(
                    "Enter the passphrase to unlock the collection {} in order to read secret {}",
                    identifier.collection_name, identifier.name
                ),
                user_interaction_mode,
                interaction_service_address,
            )
            .await?;

        self.arm_read_relock(&row);

        let hashed = hashed_secret_name(&identifier.collection_name, &identifier.name);
        match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let identifier = identifier.clone();
                self.run_plugin(move || {
                    fused.unlock_collection_and_read_secret(&identifier, &hashed, &key)
                })
                .await
            },
            PluginPair::Split(storage, encryption) => {
                let storage = storage.clone();
                let encryption = encryption.clone();
                let collection = identifier.collection_name.clone();
                self.run_plugin(move || {
                    wrappers::get_and_decrypt_secret(
                        encryption.as_ref(),
                        storage.as_ref(),
                        &collection,
                        &hashed,
                        &key,
                    )
                })
                .await
            },
        }
    }

    /// Find secrets in a collection by tag metadata.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_collection_secrets(
        &self,
        caller_pid: u32,
        request_id: u64,
        collection_name: &str,
        filter: FilterData,
        filter_operator: FilterOperator,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<Vec<SecretIdentifier>> {
        Self::validate_collection_name(collection_name)?;
        if filter.is_empty() {
            return Err(SecretsError::InvalidFilter("empty filter given".into()));
        }
        let caller_application_id = self.caller_application_id(caller_pid);

        let row = self.collection_row_checked(collection_name, &caller_application_id)?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;
        self.authentication_plugin(&row.authentication_plugin)?;

        let key = self
            .acquire_collection_key(
                caller_pid,
                request_id,
                &row,
                &pair,
                InteractionOperation::ReadSecret,
                PendingKind::FindCollectionSecrets,
                "",
                format!(
                    "Enter the passphrase to unlock the collection {collection_name} in order to find secrets"
                ),
                user_interaction_mode,
                interaction_service_address,
            )
            .await?;

        self.arm_read_relock(&row);

        match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let collection = collection_name.to_string();
                self.run_plugin(move || {
                    fused.unlock_and_find_secrets(&collection, &filter, filter_operator, &key)
                })
                .await
            },
            PluginPair::Split(storage, encryption) => {
                let storage = storage.clone();
                let encryption = encryption.clone();
                let collection = collection_name.to_string();
                self.run_plugin(move || {
                    wrappers::find_and_decrypt_secret_names(
                        encryption.as_ref(),
                        storage.as_ref(),
                        &collection,
                        &filter,
                        filter_operator,
                        &key,
                    )
                })
                .await
            },
        }
    }

    /// Delete a secret from a collection: plugin removal first, then the
    /// bookkeeping row.
    pub async fn delete_collection_secret(
        &self,
        caller_pid: u32,
        request_id: u64,
        identifier: SecretIdentifier,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        Self::validate_secret_name(&identifier.name)?;
        Self::validate_collection_name(&identifier.collection_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        let row = self.collection_row_checked(&identifier.collection_name, &caller_application_id)?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;
        self.authentication_plugin(&row.authentication_plugin)?;

        let acquired = self
            .acquire_collection_key(
                caller_pid,
                request_id,
                &row,
                &pair,
                InteractionOperation::DeleteSecret,
                PendingKind::DeleteCollectionSecret,
                &identifier.name,
                format!(
                    "Enter the passphrase to unlock the collection {} in order to delete secret {}",
                    identifier.collection_name, identifier.name
                ),
                user_interaction_mode,
                interaction_service_address,
            )
            .await?;
        // An unlocked fused collection yields no key of its own; deletion
        // proceeds under the device lock key.
        let key = if pair.is_fused() && acquired.is_empty() {
            self.context.device_lock_key()
        } else {
            acquired
        };

        // Re-validate: the row may have changed while the request was
        // suspended on the passphrase prompt.
        let row = self.collection_row_checked(&identifier.collection_name, &caller_application_id)?;
        if row.uses_device_lock_key && key.as_slice() != self.context.device_lock_key().as_slice() {
            return Err(SecretsError::IncorrectAuthenticationCode(
                "incorrect device lock key provided".into(),
            ));
        }

        let _guard = self.interleave.try_acquire(&identifier.collection_name)?;

        let hashed = hashed_secret_name(&identifier.collection_name, &identifier.name);
        let plugin_result = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let identifier = identifier.clone();
                let hashed = hashed.clone();
                self.run_plugin(move || {
                    fused.unlock_collection_and_remove_secret(&identifier, &hashed, &key)
                })
                .await
            },
            PluginPair::Split(storage, _) => {
                let storage = storage.clone();
                let collection = identifier.collection_name.clone();
                let hashed = hashed.clone();
                self.run_plugin(move || storage.remove_secret(&collection, &hashed)).await
            },
        };
        plugin_result?;

        if let Err(delete_err) = self.store.delete_secret(&identifier.collection_name, &hashed) {
            warn!(
                collection = %identifier.collection_name,
                error = %delete_err,
                "secret removed from plugin but bookkeeping row deletion failed"
            );
            return Err(delete_err.into());
        }
        Ok(())
    }

    /// Crypto API helper: record bookkeeping metadata for a secret whose
    /// bytes the crypto plugin stores directly. Requires the collection to
    /// be served by a fused encrypted-storage plugin.
    pub async fn set_collection_secret_metadata(
        &self,
        caller_pid: u32,
        _request_id: u64,
        identifier: SecretIdentifier,
    ) -> Result<()> {
        Self::validate_secret_name(&identifier.name)?;
        Self::validate_collection_name(&identifier.collection_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        if self.interleave.is_busy(&identifier.collection_name) {
            return Err(SecretsError::InterleavedRequest(format!(
                "another request is currently operating on collection {}",
                identifier.collection_name
            )));
        }

        let row = self.collection_row_checked(&identifier.collection_name, &caller_application_id)?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;
        let PluginPair::Fused(fused) = pair else {
            return Err(SecretsError::InvalidExtensionPlugin(
                "the identified collection is not encrypted by that plugin".into(),
            ));
        };

        let collection = identifier.collection_name.clone();
        let locked = self
            .run_plugin(move || fused.is_collection_locked(&collection))
            .await?;
        if locked {
            if row.uses_device_lock_key {
                return Err(SecretsError::CollectionLocked(format!(
                    "collection {} is locked and requires device lock authentication",
                    identifier.collection_name
                )));
            }
            return Err(SecretsError::InteractionRequired(format!(
                "collection {} is locked and requires user interaction to unlock",
                identifier.collection_name
            )));
        }

        let hashed = hashed_secret_name(&identifier.collection_name, &identifier.name);
        if self
            .store
            .secret_already_exists(&identifier.collection_name, &hashed)?
        {
            // Distinguishable error so the crypto sibling knows it must not
            // delete the metadata row if its own store fails.
            return Err(SecretsError::SecretAlreadyExists(format!(
                "a secret with name {} already exists in the collection {}",
                identifier.name, identifier.collection_name
            )));
        }
        self.store
            .insert_secret(secret_row_from_collection(&row, &hashed))?;
        Ok(())
    }

    /// Crypto API helper: remove the bookkeeping row for a secret whose
    /// plugin-side storage failed or was removed by the crypto plugin.
    pub async fn delete_collection_secret_metadata(
        &self,
        _caller_pid: u32,
        _request_id: u64,
        identifier: SecretIdentifier,
    ) -> Result<()> {
        Self::validate_secret_name(&identifier.name)?;
        Self::validate_collection_name(&identifier.collection_name)?;

        let hashed = hashed_secret_name(&identifier.collection_name, &identifier.name);
        self.store
            .delete_secret(&identifier.collection_name, &hashed)?;
        Ok(())
    }
}
