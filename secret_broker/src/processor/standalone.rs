// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standalone secrets: addressable without a collection, indexed under the
//! reserved collection name. Each standalone secret carries its own plugin
//! assignment and lock policy in its bookkeeping row.

use secrets_core::{
    hashed_secret_name, FilterData, FilterOperator, InteractionOperation, InteractionParameters,
    Result, Secret, SecretIdentifier, SecretsError, UnlockSemantic, UserInteractionMode,
    STANDALONE_COLLECTION,
};
use secret_plugins::{wrappers, AuthenticationTypes};
use secret_store::SecretRow;
use tracing::warn;
use zeroize::Zeroizing;

use crate::pending::PendingKind;

use super::{PluginPair, RequestProcessor};

impl RequestProcessor {
    /// Checks shared by both standalone set flows against an existing row.
    fn check_existing_standalone_row(
        &self,
        row: &SecretRow,
        caller_application_id: &str,
        secret_name: &str,
        storage_plugin: &str,
        wants_device_lock: bool,
    ) -> Result<()> {
        Self::check_access_control(
            row.access_control_mode,
            &row.owner_application_id,
            caller_application_id,
            &format!("secret {secret_name}"),
        )?;
        if row.uses_device_lock_key != wants_device_lock {
            // Never silently convert between device-lock and custom-lock
            // protection.
            let wanted = if wants_device_lock { "devicelock" } else { "customlock" };
            return Err(SecretsError::NotSupported(format!(
                "secret {secret_name} already exists and is not a {wanted} protected secret"
            )));
        }
        if !row.storage_plugin.eq_ignore_ascii_case(storage_plugin) {
            return Err(SecretsError::NotSupported(format!(
                "secret {secret_name} already exists and is not stored via plugin {storage_plugin}"
            )));
        }
        Ok(())
    }

    /// Collect standalone secret bytes from the user when requested.
    async fn collect_standalone_secret_data(
        &self,
        caller_pid: u32,
        request_id: u64,
        kind: PendingKind,
        caller_application_id: &str,
        storage_plugin: &str,
        secret: &mut Secret,
        ui_params: InteractionParameters,
        interaction_service_address: &str,
    ) -> Result<()> {
        let input_plugin = self.resolve_user_input_plugin(&ui_params.authentication_plugin_name)?;
        let mut params = ui_params;
        params.application_id = caller_application_id.to_string();
        params.secret_name = secret.identifier.name.clone();
        params.operation = InteractionOperation::RequestUserData;
        params.prompt_text = format!(
            "Enter confidential data for secret {} stored by plugin {}",
            secret.identifier.name, storage_plugin
        );
        secret.data = self
            .request_user_input(
                caller_pid,
                request_id,
                kind,
                &input_plugin,
                params,
                interaction_service_address,
            )
            .await?;
        Ok(())
    }

    /// Write a standalone secret row and payload; used by both lock flavors
    /// once the working key is known.
    async fn write_standalone_secret(
        &self,
        row: SecretRow,
        found: bool,
        pair: &PluginPair,
        secret: Secret,
        key: Zeroizing<Vec<u8>>,
    ) -> Result<()> {
        let hashed = row.hashed_secret_name.clone();
        let relock_timeout = row
            .unlock_semantic
            .relocks_on_timeout()
            .then_some(row.custom_lock_timeout_ms);

        // The bookkeeping row is written before the storage plugin.
        if found {
            self.store.update_secret(row)?;
        } else {
            self.store.insert_secret(row)?;
        }

        let mut plugin_secret = secret;
        plugin_secret.identifier.collection_name = STANDALONE_COLLECTION.to_string();

        let plugin_result = match pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let hashed = hashed.clone();
                let key = key.clone();
                self.run_plugin(move || {
                    fused.set_secret(
                        STANDALONE_COLLECTION,
                        &hashed,
                        &plugin_secret,
                        &key,
                    )
                })
                .await
            },
            PluginPair::Split(storage, encryption) => {
                let storage = storage.clone();
                let encryption = encryption.clone();
                let hashed = hashed.clone();
                let key = key.clone();
                self.run_plugin(move || {
                    wrappers::encrypt_and_store_secret(
                        encryption.as_ref(),
                        storage.as_ref(),
                        STANDALONE_COLLECTION,
                        &plugin_secret,
                        &hashed,
                        &key,
                    )
                })
                .await
            },
        };

        match plugin_result {
            Ok(()) => {
                self.key_cache.insert_standalone_key(&hashed, key);
                if let Some(timeout_ms) = relock_timeout {
                    self.key_cache.arm_standalone_relock(&hashed, timeout_ms);
                }
                Ok(())
            },
            Err(plugin_err) if !found => {
                // New row: compensate. Pre-existing rows are left intact.
                Err(self
                    .store
                    .cleanup_delete_secret(STANDALONE_COLLECTION, &hashed, plugin_err))
            },
            Err(plugin_err) => Err(plugin_err),
        }
    }

    /// Store a standalone secret keyed by the device lock key.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_standalone_device_lock_secret(
        &self,
        caller_pid: u32,
        request_id: u64,
        storage_plugin: &str,
        encryption_plugin: &str,
        mut secret: Secret,
        ui_params: Option<InteractionParameters>,
        unlock_semantic: UnlockSemantic,
        access_control_mode: secrets_core::AccessControlMode,
        _user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        Self::validate_secret_name(&secret.identifier.name)?;
        if !unlock_semantic.uses_device_lock() {
            return Err(SecretsError::NotSupported(
                "device lock secret requires a device lock unlock semantic".into(),
            ));
        }
        let pair = self.resolve_pair(storage_plugin, encryption_plugin)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        let hashed = hashed_secret_name(STANDALONE_COLLECTION, &secret.identifier.name);
        let existing = self.store.secret_metadata(STANDALONE_COLLECTION, &hashed)?;
        if let Some(row) = &existing {
            self.check_existing_standalone_row(
                row,
                &caller_application_id,
                &secret.identifier.name,
                storage_plugin,
                true,
            )?;
        }

        if let Some(ui_params) = ui_params {
            self.collect_standalone_secret_data(
                caller_pid,
                request_id,
                PendingKind::SetStandaloneDeviceLockUserInputSecret,
                &caller_application_id,
                storage_plugin,
                &mut secret,
                ui_params,
                interaction_service_address,
            )
            .await?;
        }

        let row = SecretRow {
            collection_name: STANDALONE_COLLECTION.to_string(),
            hashed_secret_name: hashed,
            owner_application_id: caller_application_id,
            uses_device_lock_key: true,
            storage_plugin: storage_plugin.to_string(),
            encryption_plugin: encryption_plugin.to_string(),
            authentication_plugin: self.config.effective_default_authentication_plugin(),
            unlock_semantic,
            custom_lock_timeout_ms: 0,
            access_control_mode,
        };
        self.write_standalone_secret(
            row,
            existing.is_some(),
            &pair,
            secret,
            self.context.device_lock_key(),
        )
        .await
    }

    /// Store a standalone secret keyed by a passphrase-derived key.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_standalone_custom_lock_secret(
        &self,
        caller_pid: u32,
        request_id: u64,
        storage_plugin: &str,
        encryption_plugin: &str,
        authentication_plugin: &str,
        mut secret: Secret,
        ui_params: Option<InteractionParameters>,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
        access_control_mode: secrets_core::AccessControlMode,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        Self::validate_secret_name(&secret.identifier.name)?;
        if unlock_semantic.uses_device_lock() {
            return Err(SecretsError::NotSupported(
                "custom lock secret requires a custom lock unlock semantic".into(),
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
        let hashed = hashed_secret_name(STANDALONE_COLLECTION, &secret.identifier.name);
        let existing = self.store.secret_metadata(STANDALONE_COLLECTION, &hashed)?;
        if let Some(row) = &existing {
            self.check_existing_standalone_row(
                row,
                &caller_application_id,
                &secret.identifier.name,
                storage_plugin,
                false,
            )?;
        }

        if let Some(ui_params) = ui_params {
            self.collect_standalone_secret_data(
                caller_pid,
                request_id,
                PendingKind::SetStandaloneCustomLockUserInputSecret,
                &caller_application_id,
                storage_plugin,
                &mut secret,
                ui_params,
                interaction_service_address,
            )
            .await?;
        }

        // User input flow for the passphrase protecting this secret.
        let params = InteractionParameters::new(InteractionOperation::StoreSecret)
            .with_application_id(&caller_application_id)
            .with_secret_name(&secret.identifier.name)
            .with_prompt_text(format!(
                "Enter the passphrase which will be used to encrypt the standalone secret {} in plugin {}",
                secret.identifier.name, storage_plugin
            ));
        let authentication_code = self
            .request_user_input(
                caller_pid,
                request_id,
                PendingKind::SetStandaloneCustomLockSecret,
                &auth_plugin,
                params,
                interaction_service_address,
            )
            .await?;
        let key = self.derive_key_for_pair(&pair, &authentication_code).await?;

        let row = SecretRow {
            collection_name: STANDALONE_COLLECTION.to_string(),
            hashed_secret_name: hashed,
            owner_application_id: caller_application_id,
            uses_device_lock_key: false,
            storage_plugin: storage_plugin.to_string(),
            encryption_plugin: encryption_plugin.to_string(),
            authentication_plugin: authentication_plugin.to_string(),
            unlock_semantic,
            custom_lock_timeout_ms,
            access_control_mode,
        };
        self.write_standalone_secret(row, existing.is_some(), &pair, secret, key)
            .await
    }

    /// Read a standalone secret.
    pub async fn get_standalone_secret(
        &self,
        caller_pid: u32,
        request_id: u64,
        secret_name: &str,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<Secret> {
        Self::validate_secret_name(secret_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        let hashed = hashed_secret_name(STANDALONE_COLLECTION, secret_name);
        let Some(row) = self.store.secret_metadata(STANDALONE_COLLECTION, &hashed)? else {
            return Err(SecretsError::InvalidSecret(
                "nonexistent secret name given".into(),
            ));
        };
        Self::check_access_control(
            row.access_control_mode,
            &row.owner_application_id,
            &caller_application_id,
            &format!("secret {secret_name}"),
        )?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;
        self.authentication_plugin(&row.authentication_plugin)?;

        let key = match self.key_cache.standalone_key(&hashed) {
            Some(key) => key,
            None => {
                if row.uses_device_lock_key {
                    return Err(SecretsError::CollectionLocked(format!(
                        "secret {secret_name} is locked and requires device lock authentication"
                    )));
                }
                if user_interaction_mode == UserInteractionMode::Prevent {
                    return Err(SecretsError::InteractionRequired(format!(
                        "authentication plugin {} requires user interaction",
                        row.authentication_plugin
                    )));
                }
                let auth_plugin = self.authentication_plugin(&row.authentication_plugin)?;
                if auth_plugin
                    .authentication_types()
                    .contains(AuthenticationTypes::APPLICATION_SPECIFIC)
                    && (user_interaction_mode != UserInteractionMode::Application
                        || interaction_service_address.is_empty())
                {
                    return Err(SecretsError::ApplicationInteractionRequired(format!(
                        "authentication plugin {} requires in-process user interaction",
                        row.authentication_plugin
                    )));
                }
                let params = InteractionParameters::new(InteractionOperation::ReadSecret)
                    .with_application_id(&caller_application_id)
                    .with_secret_name(secret_name)
                    .with_prompt_text(format!(
                        "Enter the passphrase to unlock the standalone secret {secret_name}"
                    ));
                let authentication_code = self
                    .request_user_input(
                        caller_pid,
                        request_id,
                        PendingKind::GetStandaloneSecret,
                        &auth_plugin,
                        params,
                        interaction_service_address,
                    )
                    .await?;
                let key = self.derive_key_for_pair(&pair, &authentication_code).await?;
                self.key_cache.insert_standalone_key(&hashed, key.clone());
                key
            },
        };

        if row.unlock_semantic.relocks_on_timeout() {
            self.key_cache
                .arm_standalone_relock(&hashed, row.custom_lock_timeout_ms);
        }

        let mut secret = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let hashed = hashed.clone();
                self.run_plugin(move || fused.access_secret(STANDALONE_COLLECTION, &hashed, &key))
                    .await?
            },
            PluginPair::Split(storage, encryption) => {
                let storage = storage.clone();
                let encryption = encryption.clone();
                let hashed = hashed.clone();
                self.run_plugin(move || {
                    wrappers::get_and_decrypt_secret(
                        encryption.as_ref(),
                        storage.as_ref(),
                        STANDALONE_COLLECTION,
                        &hashed,
                        &key,
                    )
                })
                .await?
            },
        };
        // Clients address standalone secrets without a collection name.
        secret.identifier = SecretIdentifier::standalone(&secret.identifier.name);
        Ok(secret)
    }

    /// Delete a standalone secret: plugin removal first, then the row.
    pub async fn delete_standalone_secret(
        &self,
        caller_pid: u32,
        _request_id: u64,
        secret_name: &str,
        _user_interaction_mode: UserInteractionMode,
    ) -> Result<()> {
        Self::validate_secret_name(secret_name)?;
        let caller_application_id = self.caller_application_id(caller_pid);

        let hashed = hashed_secret_name(STANDALONE_COLLECTION, secret_name);
        let Some(row) = self.store.secret_metadata(STANDALONE_COLLECTION, &hashed)? else {
            // No such secret, so "deleting" succeeded.
            return Ok(());
        };
        Self::check_access_control(
            row.access_control_mode,
            &row.owner_application_id,
            &caller_application_id,
            &format!("secret {secret_name}"),
        )?;
        let pair = self.resolve_pair(&row.storage_plugin, &row.encryption_plugin)?;

        let key = self
            .key_cache
            .standalone_key(&hashed)
            .unwrap_or_else(|| {
                if row.uses_device_lock_key {
                    self.context.device_lock_key()
                } else {
                    Zeroizing::new(Vec::new())
                }
            });

        let plugin_result = match &pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let hashed = hashed.clone();
                let uses_device_lock = row.uses_device_lock_key;
                self.run_plugin(move || {
                    fused.unlock_and_remove_secret(
                        STANDALONE_COLLECTION,
                        &hashed,
                        uses_device_lock,
                        &key,
                    )
                })
                .await
            },
            PluginPair::Split(storage, _) => {
                let storage = storage.clone();
                let hashed = hashed.clone();
                self.run_plugin(move || storage.remove_secret(STANDALONE_COLLECTION, &hashed))
                    .await
            },
        };
        plugin_result?;

        self.key_cache.remove_standalone_key(&hashed);
        if let Err(delete_err) = self.store.delete_secret(STANDALONE_COLLECTION, &hashed) {
            warn!(
                secret = secret_name,
                error = %delete_err,
                "standalone secret removed from plugin but bookkeeping row deletion failed"
            );
            return Err(delete_err.into());
        }
        Ok(())
    }

    /// Filtering standalone secrets is not yet supported.
    pub async fn find_standalone_secrets(
        &self,
        _caller_pid: u32,
        _request_id: u64,
        _filter: FilterData,
        _filter_operator: FilterOperator,
        _user_interaction_mode: UserInteractionMode,
        _interaction_service_address: &str,
    ) -> Result<Vec<SecretIdentifier>> {
        Err(SecretsError::NotSupported(
            "filtering standalone secrets is not yet supported".into(),
        ))
    }
}
