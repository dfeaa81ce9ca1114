// SPDX-License-Identifier: MIT OR Apache-2.0
//! The request processor: state machine in front of the bookkeeping store,
//! the plugin registry and the authentication plugins.

mod collections;
mod info;
mod keys;
mod locks;
mod secrets;
mod standalone;

use std::sync::Arc;

use secrets_core::{
    is_reserved_collection_name, InteractionParameters, Result, SecretsError,
};
use secret_plugins::{
    AuthenticationPlugin, EncryptedStoragePlugin, EncryptionPlugin, PluginRegistry, StoragePlugin,
};
use secret_store::BookkeepingStore;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::context::DaemonContext;
use crate::identity::ApplicationIdentity;
use crate::interleave::InterleaveGuardSet;
use crate::key_cache::KeyCache;
use crate::pending::{interaction_channel_closed, PendingKind, PendingRequestTable};

/// The storage/encryption pair serving a collection or standalone secret:
/// either one fused encrypted-storage plugin holding its own lock state, or
/// a distinct storage plugin paired with an encryption plugin.
pub(crate) enum PluginPair {
    Fused(Arc<dyn EncryptedStoragePlugin>),
    Split(Arc<dyn StoragePlugin>, Arc<dyn EncryptionPlugin>),
}

impl PluginPair {
    pub(crate) fn is_fused(&self) -> bool {
        matches!(self, Self::Fused(_))
    }
}

/// The state machine that services every client request.
pub struct RequestProcessor {
    pub(crate) registry: Arc<PluginRegistry>,
    pub(crate) store: Arc<BookkeepingStore>,
    pub(crate) context: Arc<DaemonContext>,
    pub(crate) identity: Arc<dyn ApplicationIdentity>,
    pub(crate) config: BrokerConfig,
    pub(crate) pending: Arc<PendingRequestTable>,
    pub(crate) key_cache: Arc<KeyCache>,
    pub(crate) interleave: InterleaveGuardSet,
}

impl RequestProcessor {
    pub fn new(
        registry: Arc<PluginRegistry>,
        store: Arc<BookkeepingStore>,
        context: Arc<DaemonContext>,
        identity: Arc<dyn ApplicationIdentity>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            context,
            identity,
            config,
            pending: Arc::new(PendingRequestTable::new()),
            key_cache: Arc::new(KeyCache::new()),
            interleave: InterleaveGuardSet::new(),
        }
    }

    /// Deliver a user-input completion event. The transport (or an
    /// in-process authentication plugin via its relay) calls this when the
    /// prompt finishes; the suspended flow resumes with the outcome.
    pub fn user_input_interaction_completed(
        &self,
        _caller_pid: u32,
        request_id: u64,
        outcome: Result<Vec<u8>>,
    ) {
        self.pending.complete_user_input(request_id, outcome);
    }

    /// Deliver a non-input authentication completion. Accepted and recorded;
    /// reserved for unlocking master-locked collections.
    pub fn authentication_completed(&self, caller_pid: u32, request_id: u64, _result: Result<()>) {
        debug!(caller_pid, request_id, "authentication completed");
    }

    /// Number of requests currently suspended awaiting user input.
    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    // ---- shared preamble helpers ----

    pub(crate) fn caller_application_id(&self, caller_pid: u32) -> String {
        if self.identity.is_platform_application(caller_pid) {
            self.identity.platform_application_id()
        } else {
            self.identity.application_id(caller_pid)
        }
    }

    pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SecretsError::InvalidCollection(
                "empty collection name given".into(),
            ));
        }
        if is_reserved_collection_name(name) {
            return Err(SecretsError::InvalidCollection(
                "reserved collection name given".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn validate_secret_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SecretsError::InvalidSecret("empty secret name given".into()));
        }
        Ok(())
    }

    /// Resolve the storage/encryption pair for the given plugin names,
    /// verifying capability membership. Equal names denote the fused case.
    pub(crate) fn resolve_pair(
        &self,
        storage_plugin: &str,
        encryption_plugin: &str,
    ) -> Result<PluginPair> {
        if storage_plugin == encryption_plugin {
            let plugin = self.registry.encrypted_storage(storage_plugin).ok_or_else(|| {
                SecretsError::InvalidExtensionPlugin(format!(
                    "no such encrypted storage plugin exists: {storage_plugin}"
                ))
            })?;
            return Ok(PluginPair::Fused(plugin));
        }
        let storage = self.registry.storage(storage_plugin).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!(
                "no such storage plugin exists: {storage_plugin}"
            ))
        })?;
        let encryption = self.registry.encryption(encryption_plugin).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!(
                "no such encryption plugin exists: {encryption_plugin}"
            ))
        })?;
        Ok(PluginPair::Split(storage, encryption))
    }

    /// Owner / system / platform access check shared by every operation that
    /// targets an existing row.
    pub(crate) fn check_access_control(
        mode: secrets_core::AccessControlMode,
        owner_application_id: &str,
        caller_application_id: &str,
        target: &str,
    ) -> Result<()> {
        use secrets_core::AccessControlMode;
        match mode {
            AccessControlMode::System => Err(SecretsError::NotSupported(
                "access control requests are not currently supported".into(),
            )),
            AccessControlMode::OwnerOnly if owner_application_id != caller_application_id => {
                Err(SecretsError::PermissionDenied(format!(
                    "{target} is owned by a different application"
                )))
            },
            AccessControlMode::OwnerOnly | AccessControlMode::NoAccessControl => Ok(()),
        }
    }

    /// Resolve the authentication plugin for a user-input request. An empty
    /// name selects the configured default (suffixed in autotest mode).
    pub(crate) fn resolve_user_input_plugin(
        &self,
        requested: &str,
    ) -> Result<Arc<dyn AuthenticationPlugin>> {
        let name = if requested.is_empty() {
            self.config.effective_default_authentication_plugin()
        } else {
            requested.to_string()
        };
        self.registry.authentication(&name).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!(
                "cannot get user input from invalid authentication plugin: {name}"
            ))
        })
    }

    pub(crate) fn authentication_plugin(
        &self,
        name: &str,
    ) -> Result<Arc<dyn AuthenticationPlugin>> {
        self.registry.authentication(name).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!(
                "no such authentication plugin available: {name}"
            ))
        })
    }

    /// Suspend the request on a user prompt and resume with the entered
    /// bytes. Registers the pending record before beginning the interaction
    /// so a synchronous completion cannot race the registration.
    pub(crate) async fn request_user_input(
        &self,
        caller_pid: u32,
        request_id: u64,
        kind: PendingKind,
        plugin: &Arc<dyn AuthenticationPlugin>,
        params: InteractionParameters,
        interaction_service_address: &str,
    ) -> Result<Vec<u8>> {
        let receiver = self.pending.register(caller_pid, request_id, kind);
        let relay = self.pending.relay();
        if let Err(err) = plugin.begin_user_input_interaction(
            caller_pid,
            request_id,
            &params,
            interaction_service_address,
            relay,
        ) {
            self.pending.discard(request_id);
            return Err(err);
        }
        receiver.await.map_err(|_| interaction_channel_closed())?
    }

    /// Submit blocking plugin work to the worker pool.
    pub(crate) async fn run_plugin<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| SecretsError::Unknown(format!("worker pool failure: {e}")))?
    }
}
