// SPDX-License-Identifier: MIT OR Apache-2.0
//! User-input pass-through and the lock-code lifecycle for plugins and the
//! bookkeeping database.

use secrets_core::{
    InteractionOperation, InteractionParameters, LockCodeTarget, Result, SecretsError,
    UserInteractionMode,
};
use secret_plugins::wrappers;

use crate::context::FORGET_SENTINEL;
use crate::pending::PendingKind;

use super::RequestProcessor;

impl RequestProcessor {
    /// Pass-through prompt to the authentication plugin; returns the
    /// user-entered bytes to the caller.
    pub async fn user_input(
        &self,
        caller_pid: u32,
        request_id: u64,
        ui_params: InteractionParameters,
    ) -> Result<Vec<u8>> {
        let caller_application_id = self.caller_application_id(caller_pid);
        let input_plugin = self.resolve_user_input_plugin(&ui_params.authentication_plugin_name)?;

        let mut params = ui_params;
        params.application_id = caller_application_id;
        if params.collection_name.is_empty() && params.secret_name.is_empty() {
            // The input is being returned to a client application rather
            // than stored; the user has to be warned about that.
            params.prompt_text = format!(
                "An application is requesting input which will be returned to the application: {}",
                params.prompt_text
            );
        }

        self.request_user_input(
            caller_pid,
            request_id,
            PendingKind::UserInput,
            &input_plugin,
            params,
            "",
        )
        .await
    }

    fn check_lock_target_permissions(
        &self,
        caller_pid: u32,
        target: &LockCodeTarget,
        verb: &str,
    ) -> Result<()> {
        match target {
            LockCodeTarget::StandaloneSecret(_) => Err(SecretsError::NotSupported(format!(
                "cannot {verb} the lock code of a standalone secret yet"
            ))),
            LockCodeTarget::Collection(_) => Err(SecretsError::NotSupported(format!(
                "cannot {verb} the lock code of a collection yet"
            ))),
            LockCodeTarget::ExtensionPlugin(_) => {
                if !self.identity.is_platform_application(caller_pid) {
                    return Err(SecretsError::PermissionDenied(
                        "only the platform application can operate on the plugin lock".into(),
                    ));
                }
                Ok(())
            },
            LockCodeTarget::BookkeepingDatabase => {
                if !self.identity.is_platform_application(caller_pid) {
                    return Err(SecretsError::PermissionDenied(
                        "only the platform application can operate on the secrets database lock"
                            .into(),
                    ));
                }
                Ok(())
            },
        }
    }

    async fn prompt_for_lock_code(
        &self,
        caller_pid: u32,
        request_id: u64,
        kind: PendingKind,
        interaction_params: &InteractionParameters,
        target: &LockCodeTarget,
        prompt_text: String,
        interaction_service_address: &str,
    ) -> Result<Vec<u8>> {
        let input_plugin =
            self.resolve_user_input_plugin(&interaction_params.authentication_plugin_name)?;
        let operation = match (target, kind) {
            (LockCodeTarget::ExtensionPlugin(_), PendingKind::ProvideLockCode) => {
                InteractionOperation::UnlockPlugin
            },
            (_, PendingKind::ProvideLockCode) => InteractionOperation::UnlockDatabase,
            (LockCodeTarget::ExtensionPlugin(_), _) => InteractionOperation::ModifyLockPlugin,
            (_, _) => InteractionOperation::ModifyLockDatabase,
        };

        let mut params = interaction_params.clone();
        params.application_id = self.caller_application_id(caller_pid);
        params.operation = operation;
        params.prompt_text = prompt_text;
        self.request_user_input(
            caller_pid,
            request_id,
            kind,
            &input_plugin,
            params,
            interaction_service_address,
        )
        .await
    }

    /// Change the lock code of a plugin or of the bookkeeping database.
    /// Prompts for the old code, then the new one, then re-keys the target.
    pub async fn modify_lock_code(
        &self,
        caller_pid: u32,
        request_id: u64,
        target: LockCodeTarget,
        interaction_params: InteractionParameters,
        _user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        self.check_lock_target_permissions(caller_pid, &target, "modify")?;

        let old_prompt = match &target {
            LockCodeTarget::ExtensionPlugin(name) => {
                format!("Enter the old lock code for the plugin: {name}")
            },
            _ => "Enter the old master lock code for device secrets".to_string(),
        };
        let old_lock_code = self
            .prompt_for_lock_code(
                caller_pid,
                request_id,
                PendingKind::ModifyLockCode,
                &interaction_params,
                &target,
                old_prompt,
                interaction_service_address,
            )
            .await?;

        let new_prompt = match &target {
            LockCodeTarget::ExtensionPlugin(name) => {
                format!("Enter the new lock code for the plugin: {name}")
            },
            _ => "Enter the new master lock code for device secrets".to_string(),
        };
        let new_lock_code = self
            .prompt_for_lock_code(
                caller_pid,
                request_id,
                PendingKind::ModifyLockCode,
                &interaction_params,
                &target,
                new_prompt,
                interaction_service_address,
            )
            .await?;

        match target {
            LockCodeTarget::ExtensionPlugin(name) => {
                self.modify_plugin_lock_code(&name, old_lock_code, new_lock_code)
                    .await
            },
            LockCodeTarget::BookkeepingDatabase => {
                self.modify_master_lock(&old_lock_code, &new_lock_code).await
            },
            LockCodeTarget::Collection(_) | LockCodeTarget::StandaloneSecret(_) => {
                unreachable!("rejected by the permission check")
            },
        }
    }

    async fn modify_plugin_lock_code(
        &self,
        plugin_name: &str,
        old_lock_code: Vec<u8>,
        new_lock_code: Vec<u8>,
    ) -> Result<()> {
        let registry = self.registry.clone();
        let name = plugin_name.to_string();
        let old = old_lock_code.clone();
        let new = new_lock_code.clone();
        let outcome = self
            .run_plugin(move || {
                Ok(wrappers::modify_lock_specific_plugin(&registry, &name, &old, &new))
            })
            .await?;
        if let Some(result) = outcome {
            return result;
        }
        // Not a storage-family plugin; try the authentication plugins.
        if let Some(plugin) = self.registry.authentication(plugin_name) {
            if !plugin.supports_locking() {
                return Err(SecretsError::NotSupported(format!(
                    "authentication plugin {plugin_name} does not support locking"
                )));
            }
            if !plugin.set_lock_code(&old_lock_code, &new_lock_code) {
                return Err(SecretsError::Unknown(format!(
                    "failed to set the lock code for authentication plugin {plugin_name}"
                )));
            }
            return Ok(());
        }
        Err(SecretsError::InvalidExtensionPlugin(format!(
            "no such plugin exists: {plugin_name}"
        )))
    }

    /// Provide the lock code to unlock a plugin or the bookkeeping database.
    pub async fn provide_lock_code(
        &self,
        caller_pid: u32,
        request_id: u64,
        target: LockCodeTarget,
        interaction_params: InteractionParameters,
        _user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<()> {
        self.check_lock_target_permissions(caller_pid, &target, "provide")?;

        if target == LockCodeTarget::BookkeepingDatabase {
            let locked = if self.store.is_initialised() {
                self.store.is_locked()?
            } else {
                true
            };
            if !locked {
                return Err(SecretsError::Unknown(
                    "the secrets database is not locked".into(),
                ));
            }

            if self.context.no_lock_code() {
                // The database was opened without a lock code on startup and
                // the code has not been modified since, so the null code
                // unlocks it.
                self.context.initialise(b"")?;
                return self.unlock_database().await;
            }
        }

        let prompt = match &target {
            LockCodeTarget::ExtensionPlugin(name) => {
                format!("Provide the unlock code for the plugin {name}")
            },
            _ => "Provide the master unlock code for device secrets".to_string(),
        };
        let lock_code = self
            .prompt_for_lock_code(
                caller_pid,
                request_id,
                PendingKind::ProvideLockCode,
                &interaction_params,
                &target,
                prompt,
                interaction_service_address,
            )
            .await?;

        match target {
            LockCodeTarget::ExtensionPlugin(name) => {
                let registry = self.registry.clone();
                let plugin_name = name.clone();
                let code = lock_code.clone();
                let outcome = self
                    .run_plugin(move || {
                        Ok(wrappers::unlock_specific_plugin(&registry, &plugin_name, &code))
                    })
                    .await?;
                if let Some(result) = outcome {
                    return result;
                }
                if let Some(plugin) = self.registry.authentication(&name) {
                    if !plugin.supports_locking() {
                        return Err(SecretsError::NotSupported(format!(
                            "authentication plugin {name} does not support locking"
                        )));
                    }
                    if !plugin.unlock(&lock_code) {
                        return Err(SecretsError::Unknown(format!(
                            "failed to unlock authentication plugin {name}"
                        )));
                    }
                    return Ok(());
                }
                Err(SecretsError::InvalidExtensionPlugin(format!(
                    "no such plugin exists: {name}"
                )))
            },
            LockCodeTarget::BookkeepingDatabase => {
                self.context.initialise(&lock_code)?;
                self.unlock_database().await
            },
            LockCodeTarget::Collection(_) | LockCodeTarget::StandaloneSecret(_) => {
                unreachable!("rejected by the permission check")
            },
        }
    }

    async fn unlock_database(&self) -> Result<()> {
        let bkdb_key = self.context.bkdb_lock_key();
        if self.store.is_initialised() {
            self.store.unlock(&bkdb_key)?;
        } else {
            self.store.initialise(&bkdb_key)?;
        }

        // Offer the device lock key to the plugins so they can unlock their
        // own master material.
        let registry = self.registry.clone();
        let device_key = self.context.device_lock_key();
        let failures = self
            .run_plugin(move || Ok(wrappers::master_unlock_plugins(&registry, &device_key)))
            .await?;
        for (plugin, err) in failures {
            tracing::warn!(plugin = %plugin, error = %err, "plugin master unlock failed");
        }
        Ok(())
    }

    /// Forget the lock code: seal the target until a subsequent
    /// `provide_lock_code`.
    pub async fn forget_lock_code(
        &self,
        caller_pid: u32,
        _request_id: u64,
        target: LockCodeTarget,
        _interaction_params: InteractionParameters,
        _user_interaction_mode: UserInteractionMode,
        _interaction_service_address: &str,
    ) -> Result<()> {
        self.check_lock_target_permissions(caller_pid, &target, "forget")?;

        match target {
            LockCodeTarget::ExtensionPlugin(name) => {
                let registry = self.registry.clone();
                let plugin_name = name.clone();
                let outcome = self
                    .run_plugin(move || Ok(wrappers::lock_specific_plugin(&registry, &plugin_name)))
                    .await?;
                if let Some(result) = outcome {
                    return result;
                }
                if let Some(plugin) = self.registry.authentication(&name) {
                    if !plugin.supports_locking() {
                        return Err(SecretsError::NotSupported(format!(
                            "authentication plugin {name} does not support locking"
                        )));
                    }
                    if !plugin.lock() {
                        return Err(SecretsError::Unknown(format!(
                            "failed to lock authentication plugin {name}"
                        )));
                    }
                    return Ok(());
                }
                Err(SecretsError::InvalidExtensionPlugin(format!(
                    "no such plugin exists: {name}"
                )))
            },
            LockCodeTarget::BookkeepingDatabase => {
                // Re-initialise key data with the sentinel so the database
                // stays sealed until a lock code is provided again.
                self.context.initialise(&FORGET_SENTINEL)?;
                self.context.set_no_lock_code(false);
                let lock_result = self.store.lock();

                let registry = self.registry.clone();
                let failures = self
                    .run_plugin(move || Ok(wrappers::master_lock_plugins(&registry)))
                    .await?;
                for (plugin, err) in failures {
                    tracing::warn!(plugin = %plugin, error = %err, "plugin master lock failed");
                }
                Ok(lock_result?)
            },
            LockCodeTarget::Collection(_) | LockCodeTarget::StandaloneSecret(_) => {
                unreachable!("rejected by the permission check")
            },
        }
    }
}
