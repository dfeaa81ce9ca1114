// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability traits implemented by extension plugins.

use std::sync::Arc;

use secrets_core::{
    FilterData, FilterOperator, InteractionParameters, Result, Secret, SecretIdentifier,
    SecretsError,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// A secret as held by a plain storage plugin: the name and payload are
/// opaque ciphertext (produced by the paired encryption plugin), the filter
/// map stays readable so the plugin can answer find queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub name_ciphertext: Vec<u8>,
    pub data_ciphertext: Vec<u8>,
    pub filter_data: FilterData,
}

/// Bitset of authentication mechanisms a plugin offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthenticationTypes(pub u32);

impl AuthenticationTypes {
    pub const NONE: Self = Self(0);
    /// The plugin prompts through the system interaction service.
    pub const SYSTEM_DEFAULT: Self = Self(1);
    /// The plugin requires an in-process prompt hosted by the calling
    /// application (it cannot raise system UI itself).
    pub const APPLICATION_SPECIFIC: Self = Self(2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AuthenticationTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Completion events emitted by authentication plugins.
#[derive(Debug)]
pub enum InteractionEvent {
    /// A user-input prompt finished; carries the entered bytes on success.
    UserInputCompleted {
        caller_pid: u32,
        request_id: u64,
        result: Result<Vec<u8>>,
    },
    /// A non-input authentication flow finished.
    AuthenticationCompleted {
        caller_pid: u32,
        request_id: u64,
        result: Result<()>,
    },
}

/// Clonable handle through which an authentication plugin delivers its
/// completion events back to the request processor.
#[derive(Clone)]
pub struct InteractionRelay {
    handler: Arc<dyn Fn(InteractionEvent) + Send + Sync>,
}

impl InteractionRelay {
    pub fn new(handler: impl Fn(InteractionEvent) + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn user_input_completed(&self, caller_pid: u32, request_id: u64, result: Result<Vec<u8>>) {
        (self.handler)(InteractionEvent::UserInputCompleted {
            caller_pid,
            request_id,
            result,
        });
    }

    pub fn authentication_completed(&self, caller_pid: u32, request_id: u64, result: Result<()>) {
        (self.handler)(InteractionEvent::AuthenticationCompleted {
            caller_pid,
            request_id,
            result,
        });
    }
}

impl std::fmt::Debug for InteractionRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionRelay").finish_non_exhaustive()
    }
}

fn locking_unsupported(name: &str) -> SecretsError {
    SecretsError::NotSupported(format!("plugin {name} does not support locking"))
}

/// Stores opaque ciphertext records, paired with an encryption plugin by the
/// request processor.
pub trait StoragePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    fn create_collection(&self, collection_name: &str) -> Result<()>;
    fn remove_collection(&self, collection_name: &str) -> Result<()>;

    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        record: EncryptedRecord,
    ) -> Result<()>;
    fn get_secret(&self, collection_name: &str, hashed_secret_name: &str)
        -> Result<EncryptedRecord>;
    fn remove_secret(&self, collection_name: &str, hashed_secret_name: &str) -> Result<()>;

    /// Match the filter against stored records, returning
    /// (hashed secret name, encrypted secret name) pairs. Identifier
    /// recovery happens in the wrapper layer, which holds the key.
    fn find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
    ) -> Result<Vec<(String, Vec<u8>)>>;

    /// Re-encrypt stored records from `old_key` to `new_key` using the given
    /// encryption plugin. `collection_name` of `None` targets standalone
    /// records selected by `hashed_secret_names`; `Some` with an empty name
    /// list targets every record in the collection.
    fn reencrypt_secrets(
        &self,
        collection_name: Option<&str>,
        hashed_secret_names: &[String],
        old_key: &[u8],
        new_key: &[u8],
        encryption: &dyn EncryptionPlugin,
    ) -> Result<()>;

    /// Refresh plugin-held master key material after a device-lock rekey.
    fn modify_master_lock(&self, _old_device_lock_key: &[u8], _new_device_lock_key: &[u8]) -> Result<()> {
        Ok(())
    }
    fn master_unlock(&self, _device_lock_key: &[u8]) -> Result<()> {
        Ok(())
    }
    fn master_lock(&self) -> Result<()> {
        Ok(())
    }

    fn supports_locking(&self) -> bool {
        false
    }
    fn lock(&self) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
    fn unlock(&self, _lock_code: &[u8]) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
    fn set_lock_code(&self, _old_lock_code: &[u8], _new_lock_code: &[u8]) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
}

/// Derives keys from authentication codes and transforms secret bytes.
pub trait EncryptionPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    fn derive_key_from_code(
        &self,
        authentication_code: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    fn supports_locking(&self) -> bool {
        false
    }
    fn lock(&self) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
    fn unlock(&self, _lock_code: &[u8]) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
    fn set_lock_code(&self, _old_lock_code: &[u8], _new_lock_code: &[u8]) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
}

/// Fused storage + encryption: the plugin owns per-collection lock state and
/// encrypts its own records, so the broker never holds its collection keys.
pub trait EncryptedStoragePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    fn create_collection(&self, collection_name: &str, key: &[u8]) -> Result<()>;
    fn remove_collection(&self, collection_name: &str) -> Result<()>;
    fn is_collection_locked(&self, collection_name: &str) -> Result<bool>;

    fn derive_key_from_code(
        &self,
        authentication_code: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;

    fn unlock_collection_and_store_secret(
        &self,
        secret: &Secret,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<()>;
    fn unlock_collection_and_read_secret(
        &self,
        identifier: &SecretIdentifier,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<Secret>;
    fn unlock_collection_and_remove_secret(
        &self,
        identifier: &SecretIdentifier,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<()>;
    fn unlock_and_find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
        key: &[u8],
    ) -> Result<Vec<SecretIdentifier>>;

    /// Read a standalone record directly under the given key.
    fn access_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<Secret>;
    /// Write a standalone record directly under the given key.
    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        secret: &Secret,
        key: &[u8],
    ) -> Result<()>;
    /// Remove a standalone record.
    fn unlock_and_remove_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        uses_device_lock: bool,
        key: &[u8],
    ) -> Result<()>;

    fn unlock_collection_and_reencrypt(
        &self,
        collection_name: &str,
        old_key: &[u8],
        new_key: &[u8],
        uses_device_lock: bool,
    ) -> Result<()>;

    fn modify_master_lock(&self, _old_device_lock_key: &[u8], _new_device_lock_key: &[u8]) -> Result<()> {
        Ok(())
    }
    fn master_unlock(&self, _device_lock_key: &[u8]) -> Result<()> {
        Ok(())
    }
    fn master_lock(&self) -> Result<()> {
        Ok(())
    }

    fn supports_locking(&self) -> bool {
        false
    }
    fn lock(&self) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
    fn unlock(&self, _lock_code: &[u8]) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
    fn set_lock_code(&self, _old_lock_code: &[u8], _new_lock_code: &[u8]) -> Result<()> {
        Err(locking_unsupported(self.name()))
    }
}

/// Drives user prompts. `begin_user_input_interaction` must return quickly;
/// the entered input arrives later through the relay on an arbitrary thread.
pub trait AuthenticationPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    fn authentication_types(&self) -> AuthenticationTypes;

    fn begin_user_input_interaction(
        &self,
        caller_pid: u32,
        request_id: u64,
        params: &InteractionParameters,
        interaction_service_address: &str,
        relay: InteractionRelay,
    ) -> Result<()>;

    fn supports_locking(&self) -> bool {
        false
    }
    fn lock(&self) -> bool {
        false
    }
    fn unlock(&self, _lock_code: &[u8]) -> bool {
        false
    }
    fn set_lock_code(&self, _old_lock_code: &[u8], _new_lock_code: &[u8]) -> bool {
        false
    }
}
