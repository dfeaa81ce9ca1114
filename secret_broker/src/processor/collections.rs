// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collection lifecycle: create (device-lock and custom-lock) and delete.
//!
//! Create writes the bookkeeping row before the plugin materializes the
//! collection, then compensates with a cleanup-delete if the plugin fails.
//! Delete asks the plugin first and only then removes the row. Both
//! orderings ensure that only the bookkeeping row can be "wrong", and a
//! wrong row is recoverable; rolling back the insert instead of
//! compensating is forbidden, because a successful plugin create followed
//! by a failed rollback would leave an orphan.

use secrets_core::{
    AccessControlMode, InteractionOperation, InteractionParameters, Result, SecretsError,
    UnlockSemantic, UserInteractionMode,
};
use secret_plugins::AuthenticationTypes;
use secret_store::CollectionRow;
use tracing::warn;

use crate::pending::PendingKind;

use super::{PluginPair, RequestProcessor};

impl RequestProcessor {
    /// Register and materialize a collection keyed by the device lock key.
    pub async fn create_device_lock_collection(
        &self,
        caller_pid: u32,
        _request_id: u64,
        collection_name: &str,
        storage_plugin: &str,
        encryption_plugin: &str,
        unlock_semantic: UnlockSemantic,
        access_control_mode: AccessControlMode,
    ) -> Result<()> {
        Self::validate_collection_name(collection_name)?;
        if !unlock_semantic.uses_device_lock() {
            return Err(SecretsError::NotSupported(
                "device lock collection requires a device lock unlock semantic".into(),
            ));
        }
        let pair = self.resolve_pair(storage_plugin, encryption_plugin)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        if self.store.collection_already_exists(collection_name)? {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_string(),
            ));
        }

        let _guard = self.interleave.try_acquire(collection_name)?;

        let row = CollectionRow {
            name: collection_name.to_string(),
            owner_application_id: caller_application_id,
            uses_device_lock_key: true,
            storage_plugin: storage_plugin.to_string(),
            encryption_plugin: encryption_plugin.to_string(),
            authentication_plugin: self.config.effective_default_authentication_plugin(),
            unlock_semantic,
            custom_lock_timeout_ms: 0,
            access_control_mode,
        };
        self.store.insert_collection(row.clone())?;

        let device_lock_key = self.context.device_lock_key();
        let plugin_result = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let name = collection_name.to_string();
                let key = device_lock_key.clone();
                self.run_plugin(move || fused.create_collection(&name, &key)).await
            },
            PluginPair::Split(storage, _) => {
                let storage = storage.clone();
                let name = collection_name.to_string();
                self.run_plugin(move || storage.create_collection(&name)).await
            },
        };

        match plugin_result {
            Err(plugin_err) => Err(self
                .store
                .cleanup_delete_collection(collection_name, plugin_err)),
            Ok(()) => {
                if !pair.is_fused() {
                    self.cache_collection_key(&row, device_lock_key);
                }
                Ok(())
            },
        }
    }

    /// Register and materialize a collection keyed by a passphrase-derived
    /// key obtained through the authentication plugin.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_custom_lock_collection(
        &self,
        caller_pid: u32,
        request_id: u64,
        collection_name: &str,
        storage_plugin: &str,
        encryption_plugin: &str,
        authentication_plugin: &str,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
        access_control_mode: AccessControlMode,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        Self::validate_collection_name(collection_name)?;
        if unlock_semantic.uses_device_lock() {
            return Err(SecretsError::NotSupported(
                "custom lock collection requires a custom lock unlock semantic".into(),
            ));
        }
        let pair = self.resolve_pair(storage_plugin, encryption_plugin)?;
        let auth_plugin = self.authentication_plugin(authentication_plugin)?;
        if auth_plugin
            .authentication_types()
            .contains(AuthenticationTypes::APPLICATION_SPECIFIC)
            && (user_interaction_mode != UserInteractionMode::Application
                || interaction_service_address.is_empty())
        {
            return Err(SecretsError::ApplicationInteractionRequired(format!(
                "authentication plugin {authentication_plugin} requires in-process user interaction"
            )));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::InteractionRequired(format!(
                "authentication plugin {authentication_plugin} requires user interaction"
            )));
        }

        let caller_application_id = self.caller_application_id(caller_pid);
        if self.store.collection_already_exists(collection_name)? {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_string(),
            ));
        }

        // User input flow for the passphrase the collection key derives from.
        let params = InteractionParameters::new(InteractionOperation::CreateCollection)
            .with_application_id(&caller_application_id)
            .with_collection_name(collection_name)
            .with_prompt_text(format!(
                "Enter the passphrase which will be used to encrypt the new collection {collection_name} in plugin {storage_plugin}"
            ));
        let authentication_code = self
            .request_user_input(
                caller_pid,
                request_id,
                PendingKind::CreateCustomLockCollection,
                &auth_plugin,
                params,
                interaction_service_address,
            )
            .await?;

        // Re-check existence: the collection may have been created while the
        // user interaction flow was in progress.
        if self.store.collection_already_exists(collection_name)? {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_string(),
            ));
        }

        let _guard = self.interleave.try_acquire(collection_name)?;

        let row = CollectionRow {
            name: collection_name.to_string(),
            owner_application_id: caller_application_id,
            uses_device_lock_key: false,
            storage_plugin: storage_plugin.to_string(),
            encryption_plugin: encryption_plugin.to_string(),
            authentication_plugin: authentication_plugin.to_string(),
            unlock_semantic,
            custom_lock_timeout_ms,
            access_control_mode,
        };
        self.store.insert_collection(row.clone())?;

        let key = match self.derive_key_for_pair(&pair, &authentication_code).await {
            Ok(key) => key,
            Err(derive_err) => {
                return Err(self
                    .store
                    .cleanup_delete_collection(collection_name, derive_err));
            },
        };

        let plugin_result = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let name = collection_name.to_string();
                let key = key.clone();
                self.run_plugin(move || fused.create_collection(&name, &key)).await
            },
            PluginPair::Split(storage, _) => {
                let storage = storage.clone();
                let name = collection_name.to_string();
                self.run_plugin(move || storage.create_collection(&name)).await
            },
        };

        match plugin_result {
            Err(plugin_err) => Err(self
                .store
                .cleanup_delete_collection(collection_name, plugin_err)),
            Ok(()) => {
                if !pair.is_fused() {
                    self.cache_collection_key(&row, key);
                }
                Ok(())
            },
        }
    }

    /// Remove a collection plugin-side, then remove its bookkeeping row.
    pub async fn delete_collection(
        &self,
        caller_pid: u32,
        _request_id: u64,
        collection_name: &str,
        _user_interaction_mode: UserInteractionMode,
    ) -> Result<()> {
        Self::validate_collection_name(collection_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        let Some(row) = self.store.collection_metadata(collection_name)? else {
            // No such collection, so "deleting" succeeded.
            return Ok(());
        };

        Self::check_access_control(
            row.access_control_mode,
            &row.owner_application_id,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;

        let _guard = self.interleave.try_acquire(collection_name)?;

        let plugin_result = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let name = collection_name.to_string();
                self.run_plugin(move || fused.remove_collection(&name)).await
            },
            PluginPair::Split(storage, _) => {
                let storage = storage.clone();
                let name = collection_name.to_string();
                self.run_plugin(move || storage.remove_collection(&name)).await
            },
        };
        // A failed plugin delete aborts before the row is touched.
        plugin_result?;

        self.key_cache.remove_collection_key(collection_name);
        if let Err(delete_err) = self.store.delete_collection(collection_name) {
            warn!(
                collection = collection_name,
                error = %delete_err,
                "collection removed from plugin but bookkeeping row deletion failed"
            );
            return Err(delete_err.into());
        }
        Ok(())
    }
}
