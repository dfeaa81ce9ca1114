// SPDX-License-Identifier: MIT OR Apache-2.0
//! The bookkeeping store engine.
//!
//! All tables live behind a single mutex; every public operation runs as one
//! atomic transaction (multi-step check+insert sequences execute inside the
//! critical section). The store is sealed under the bookkeeping lock key via
//! an AES-256-GCM canary: `unlock` proves key possession by opening the
//! canary, `reencrypt` re-seals it under a new key.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use parking_lot::Mutex;
use rand::RngCore;
use secrets_core::SecretsError;

use crate::error::{StoreError, StoreResult};
use crate::rows::{CollectionRow, SecretRow};

/// Plaintext sealed into the lock canary.
const CANARY: &[u8] = b"bookkeeping-lock-canary-v1";

/// Nonce size for the canary AEAD.
const NONCE_SIZE: usize = 12;

#[derive(Default)]
struct Inner {
    initialised: bool,
    locked: bool,
    /// nonce || ciphertext of [`CANARY`] under the current lock key.
    canary: Vec<u8>,
    collections: HashMap<String, CollectionRow>,
    secrets: HashMap<(String, String), SecretRow>,
}

impl Inner {
    fn check_open(&self) -> StoreResult<()> {
        if !self.initialised {
            return Err(StoreError::NotInitialised);
        }
        if self.locked {
            return Err(StoreError::Locked);
        }
        Ok(())
    }
}

/// The master metadata database.
pub struct BookkeepingStore {
    inner: Mutex<Inner>,
}

impl Default for BookkeepingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookkeepingStore {
    /// Create an uninitialised store. Row operations fail until
    /// [`initialise`](Self::initialise) is called with a lock key.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                locked: true,
                ..Inner::default()
            }),
        }
    }

    fn seal_canary(key: &[u8]) -> StoreResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| StoreError::Seal(format!("invalid lock key: {e}")))?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, CANARY)
            .map_err(|e| StoreError::Seal(format!("canary seal failed: {e}")))?;
        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open_canary(key: &[u8], sealed: &[u8]) -> StoreResult<()> {
        if sealed.len() < NONCE_SIZE {
            return Err(StoreError::Seal("canary too short".into()));
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::KeyMismatch)?;
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &sealed[NONCE_SIZE..])
            .map_err(|_| StoreError::KeyMismatch)?;
        if plaintext == CANARY {
            Ok(())
        } else {
            Err(StoreError::KeyMismatch)
        }
    }

    /// Initialise the store under the given lock key and unlock it.
    ///
    /// If the store is already initialised the key is verified against the
    /// current canary instead; a matching key unlocks the store.
    pub fn initialise(&self, lock_key: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.initialised {
            Self::open_canary(lock_key, &inner.canary)?;
            inner.locked = false;
            return Ok(());
        }
        inner.canary = Self::seal_canary(lock_key)?;
        inner.initialised = true;
        inner.locked = false;
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.inner.lock().initialised
    }

    pub fn is_locked(&self) -> StoreResult<bool> {
        let inner = self.inner.lock();
        if !inner.initialised {
            return Err(StoreError::NotInitialised);
        }
        Ok(inner.locked)
    }

    /// Unlock the store by proving possession of the lock key.
    pub fn unlock(&self, lock_key: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.initialised {
            return Err(StoreError::NotInitialised);
        }
        Self::open_canary(lock_key, &inner.canary)?;
        inner.locked = false;
        Ok(())
    }

    /// Lock the store. Row operations fail until the next `unlock`.
    pub fn lock(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.initialised {
            return Err(StoreError::NotInitialised);
        }
        inner.locked = true;
        Ok(())
    }

    /// Re-seal the store under a new lock key, verifying the old one first.
    pub fn reencrypt(&self, old_key: &[u8], new_key: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.initialised {
            return Err(StoreError::NotInitialised);
        }
        Self::open_canary(old_key, &inner.canary)?;
        inner.canary = Self::seal_canary(new_key)?;
        Ok(())
    }

    // ---- collections table ----

    pub fn collection_names(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        inner.check_open()?;
        let mut names: Vec<String> = inner.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn collection_already_exists(&self, name: &str) -> StoreResult<bool> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner.collections.contains_key(name))
    }

    pub fn collection_metadata(&self, name: &str) -> StoreResult<Option<CollectionRow>> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner.collections.get(name).cloned())
    }

    /// Insert a collection row; fails if the name is already present.
    /// The existence check and the insert are one transaction.
    pub fn insert_collection(&self, row: CollectionRow) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        if inner.collections.contains_key(&row.name) {
            return Err(StoreError::RowExists(row.name));
        }
        inner.collections.insert(row.name.clone(), row);
        Ok(())
    }

    /// Delete a collection row and every secret row inside it.
    /// Deleting an absent collection succeeds vacuously.
    pub fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.collections.remove(name);
        inner.secrets.retain(|(collection, _), _| collection != name);
        Ok(())
    }

    /// Best-effort removal of a collection row after a failed plugin
    /// operation. Returns the error the caller should surface: the prior
    /// error when cleanup succeeds, the cleanup error when it does not.
    pub fn cleanup_delete_collection(&self, name: &str, prior: SecretsError) -> SecretsError {
        match self.delete_collection(name) {
            Ok(()) => prior,
            Err(cleanup_err) => cleanup_err.into(),
        }
    }

    // ---- secrets table ----

    pub fn secret_already_exists(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> StoreResult<bool> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner
            .secrets
            .contains_key(&(collection_name.to_string(), hashed_secret_name.to_string())))
    }

    pub fn secret_metadata(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> StoreResult<Option<SecretRow>> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner
            .secrets
            .get(&(collection_name.to_string(), hashed_secret_name.to_string()))
            .cloned())
    }

    pub fn hashed_secret_names(&self, collection_name: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        inner.check_open()?;
        let mut names: Vec<String> = inner
            .secrets
            .keys()
            .filter(|(collection, _)| collection == collection_name)
            .map(|(_, hashed)| hashed.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn insert_secret(&self, row: SecretRow) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let key = (row.collection_name.clone(), row.hashed_secret_name.clone());
        if inner.secrets.contains_key(&key) {
            return Err(StoreError::RowExists(row.hashed_secret_name));
        }
        inner.secrets.insert(key, row);
        Ok(())
    }

    pub fn update_secret(&self, row: SecretRow) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let key = (row.collection_name.clone(), row.hashed_secret_name.clone());
        if !inner.secrets.contains_key(&key) {
            return Err(StoreError::NoSuchRow(row.hashed_secret_name));
        }
        inner.secrets.insert(key, row);
        Ok(())
    }

    /// Delete a secret row. Deleting an absent row succeeds vacuously.
    pub fn delete_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner
            .secrets
            .remove(&(collection_name.to_string(), hashed_secret_name.to_string()));
        Ok(())
    }

    /// Best-effort removal of a secret row after a failed plugin operation.
    /// Same surfacing rule as [`cleanup_delete_collection`](Self::cleanup_delete_collection).
    pub fn cleanup_delete_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        prior: SecretsError,
    ) -> SecretsError {
        match self.delete_secret(collection_name, hashed_secret_name) {
            Ok(()) => prior,
            Err(cleanup_err) => cleanup_err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrets_core::{AccessControlMode, UnlockSemantic};

    use super::*;

    const KEY_A: [u8; 32] = [7u8; 32];
    const KEY_B: [u8; 32] = [9u8; 32];

    fn open_store() -> BookkeepingStore {
        let store = BookkeepingStore::new();
        store.initialise(&KEY_A).unwrap();
        store
    }

    fn collection_row(name: &str) -> CollectionRow {
        CollectionRow {
            name: name.into(),
            owner_application_id: "app:1".into(),
            uses_device_lock_key: true,
            storage_plugin: "store".into(),
            encryption_plugin: "enc".into(),
            authentication_plugin: "auth".into(),
            unlock_semantic: UnlockSemantic::DeviceLockKeepUnlocked,
            custom_lock_timeout_ms: 0,
            access_control_mode: AccessControlMode::OwnerOnly,
        }
    }

    fn secret_row(collection: &str, hashed: &str) -> SecretRow {
        SecretRow {
            collection_name: collection.into(),
            hashed_secret_name: hashed.into(),
            owner_application_id: "app:1".into(),
            uses_device_lock_key: true,
            storage_plugin: "store".into(),
            encryption_plugin: "enc".into(),
            authentication_plugin: "auth".into(),
            unlock_semantic: UnlockSemantic::DeviceLockKeepUnlocked,
            custom_lock_timeout_ms: 0,
            access_control_mode: AccessControlMode::OwnerOnly,
        }
    }

    #[test]
    fn test_uninitialised_store_refuses_rows() {
        let store = BookkeepingStore::new();
        assert!(!store.is_initialised());
        assert_eq!(store.collection_names(), Err(StoreError::NotInitialised));
    }

    #[test]
    fn test_insert_and_list_collections() {
        let store = open_store();
        store.insert_collection(collection_row("notes")).unwrap();
        store.insert_collection(collection_row("wallet")).unwrap();

        assert_eq!(store.collection_names().unwrap(), vec!["notes", "wallet"]);
        assert!(store.collection_already_exists("notes").unwrap());
        assert!(!store.collection_already_exists("other").unwrap());
    }

    #[test]
    fn test_duplicate_collection_insert_fails() {
        let store = open_store();
        store.insert_collection(collection_row("notes")).unwrap();
        let err = store.insert_collection(collection_row("notes")).unwrap_err();
        assert_eq!(err, StoreError::RowExists("notes".into()));
    }

    #[test]
    fn test_delete_collection_cascades_secrets() {
        let store = open_store();
        store.insert_collection(collection_row("notes")).unwrap();
        store.insert_secret(secret_row("notes", "h1")).unwrap();
        store.insert_secret(secret_row("notes", "h2")).unwrap();
        store.insert_secret(secret_row("standalone", "h3")).unwrap();

        store.delete_collection("notes").unwrap();

        assert!(!store.collection_already_exists("notes").unwrap());
        assert!(store.hashed_secret_names("notes").unwrap().is_empty());
        assert_eq!(store.hashed_secret_names("standalone").unwrap(), vec!["h3"]);
    }

    #[test]
    fn test_delete_absent_collection_is_vacuous() {
        let store = open_store();
        assert!(store.delete_collection("ghost").is_ok());
    }

    #[test]
    fn test_cleanup_delete_surfaces_prior_error() {
        let store = open_store();
        store.insert_collection(collection_row("bad")).unwrap();

        let prior = SecretsError::Failed("plugin exploded".into());
        let surfaced = store.cleanup_delete_collection("bad", prior.clone());
        assert_eq!(surfaced, prior);
        assert!(!store.collection_already_exists("bad").unwrap());
    }

    #[test]
    fn test_cleanup_delete_surfaces_cleanup_error_when_locked() {
        let store = open_store();
        store.insert_collection(collection_row("bad")).unwrap();
        store.lock().unwrap();

        let prior = SecretsError::Failed("plugin exploded".into());
        let surfaced = store.cleanup_delete_collection("bad", prior);
        assert!(matches!(surfaced, SecretsError::DaemonLocked(_)));
    }

    #[test]
    fn test_update_requires_existing_secret() {
        let store = open_store();
        let err = store.update_secret(secret_row("notes", "h1")).unwrap_err();
        assert_eq!(err, StoreError::NoSuchRow("h1".into()));

        store.insert_secret(secret_row("notes", "h1")).unwrap();
        let mut row = secret_row("notes", "h1");
        row.uses_device_lock_key = false;
        store.update_secret(row).unwrap();
        let fetched = store.secret_metadata("notes", "h1").unwrap().unwrap();
        assert!(!fetched.uses_device_lock_key);
    }

    #[test]
    fn test_unlock_with_wrong_key_fails() {
        let store = open_store();
        store.lock().unwrap();
        assert!(store.is_locked().unwrap());

        assert_eq!(store.unlock(&KEY_B), Err(StoreError::KeyMismatch));
        assert!(store.is_locked().unwrap());

        store.unlock(&KEY_A).unwrap();
        assert!(!store.is_locked().unwrap());
    }

    #[test]
    fn test_reencrypt_swaps_accepted_key() {
        let store = open_store();
        store.reencrypt(&KEY_A, &KEY_B).unwrap();

        store.lock().unwrap();
        assert_eq!(store.unlock(&KEY_A), Err(StoreError::KeyMismatch));
        store.unlock(&KEY_B).unwrap();
    }

    #[test]
    fn test_reencrypt_requires_old_key() {
        let store = open_store();
        assert_eq!(store.reencrypt(&KEY_B, &KEY_B), Err(StoreError::KeyMismatch));

        // The original key still opens the store.
        store.lock().unwrap();
        store.unlock(&KEY_A).unwrap();
    }

    #[test]
    fn test_locked_store_refuses_rows_but_keeps_them() {
        let store = open_store();
        store.insert_collection(collection_row("notes")).unwrap();
        store.lock().unwrap();

        assert_eq!(store.collection_names(), Err(StoreError::Locked));

        store.unlock(&KEY_A).unwrap();
        assert_eq!(store.collection_names().unwrap(), vec!["notes"]);
    }

    #[test]
    fn test_initialise_twice_verifies_key() {
        let store = open_store();
        assert_eq!(store.initialise(&KEY_B), Err(StoreError::KeyMismatch));
        assert!(store.initialise(&KEY_A).is_ok());
    }
}
