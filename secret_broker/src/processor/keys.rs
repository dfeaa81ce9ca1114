// SPDX-License-Identifier: MIT OR Apache-2.0
//! Working-key acquisition: the shared front half of every operation that
//! reads or writes ciphered bytes.

use secrets_core::{
    InteractionOperation, InteractionParameters, Result, SecretsError, UserInteractionMode,
};
use secret_plugins::AuthenticationTypes;
use secret_store::CollectionRow;
use zeroize::Zeroizing;

use crate::pending::PendingKind;

use super::{PluginPair, RequestProcessor};

impl RequestProcessor {
    /// Obtain the working key for a collection operation.
    ///
    /// Fused pairs: if the plugin reports the collection unlocked, an empty
    /// key is returned (the plugin holds its own). Split pairs: a cached key
    /// is returned directly. Otherwise a locked device-lock collection fails,
    /// `Prevent` mode fails, and a passphrase prompt plus derivation runs;
    /// for split pairs the derived key is cached (arming the relock timer
    /// when the semantic asks for one).
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn acquire_collection_key(
        &self,
        caller_pid: u32,
        request_id: u64,
        row: &CollectionRow,
        pair: &PluginPair,
        operation: InteractionOperation,
        pending_kind: PendingKind,
        secret_name: &str,
        prompt_text: String,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        match pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                let collection_name = row.name.clone();
                let locked = self
                    .run_plugin(move || fused.is_collection_locked(&collection_name))
                    .await?;
                if !locked {
                    // The plugin holds its own key while unlocked.
                    return Ok(Zeroizing::new(Vec::new()));
                }
            },
            PluginPair::Split(_, _) => {
                if let Some(key) = self.key_cache.collection_key(&row.name) {
                    return Ok(key);
                }
            },
        }

        if row.uses_device_lock_key {
            return Err(SecretsError::CollectionLocked(format!(
                "collection {} is locked and requires device lock authentication",
                row.name
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

        let params = InteractionParameters::new(operation)
            .with_application_id(self.caller_application_id(caller_pid))
            .with_collection_name(&row.name)
            .with_secret_name(secret_name)
            .with_prompt_text(prompt_text);
        let authentication_code = self
            .request_user_input(
                caller_pid,
                request_id,
                pending_kind,
                &auth_plugin,
                params,
                interaction_service_address,
            )
            .await?;

        let key = self
            .derive_key_for_pair(pair, &authentication_code)
            .await?;

        if !pair.is_fused() {
            self.cache_collection_key(row, key.clone());
        }
        Ok(key)
    }

    /// Derive an unlock key from an authentication code using the pair's
    /// encryption capability and the process salt.
    pub(crate) async fn derive_key_for_pair(
        &self,
        pair: &PluginPair,
        authentication_code: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let code = authentication_code.to_vec();
        let salt = self.context.salt().to_vec();
        match pair {
            PluginPair::Fused(plugin) => {
                let fused = plugin.clone();
                self.run_plugin(move || fused.derive_key_from_code(&code, &salt))
                    .await
            },
            PluginPair::Split(_, encryption) => {
                let encryption = encryption.clone();
                self.run_plugin(move || encryption.derive_key_from_code(&code, &salt))
                    .await
            },
        }
    }

    /// Cache a split-pair unlock key and arm the relock timer if the
    /// collection relocks on timeout.
    pub(crate) fn cache_collection_key(&self, row: &CollectionRow, key: Zeroizing<Vec<u8>>) {
        self.key_cache.insert_collection_key(&row.name, key);
        if row.unlock_semantic.relocks_on_timeout() {
            self.key_cache
                .arm_collection_relock(&row.name, row.custom_lock_timeout_ms);
        }
    }

    /// Arm the read-path relock timer for a timeout-relock collection.
    pub(crate) fn arm_read_relock(&self, row: &CollectionRow) {
        if row.unlock_semantic.relocks_on_timeout() {
            self.key_cache
                .arm_collection_relock(&row.name, row.custom_lock_timeout_ms);
        }
    }
}
