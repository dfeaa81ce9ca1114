// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference in-memory plugins.
//!
//! These back the daemon in autotest mode and every test in the workspace:
//! a plain storage plugin, an HKDF/AES-GCM encryption plugin, a fused
//! encrypted-storage plugin with per-collection lock state, and a scripted
//! authentication plugin. The storage plugins carry fault-injection switches
//! so recovery paths can be exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use secrets_core::{
    FilterData, FilterOperator, InteractionParameters, Result, Secret, SecretIdentifier,
    SecretsError,
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::traits::{
    AuthenticationPlugin, AuthenticationTypes, EncryptedRecord, EncryptedStoragePlugin,
    EncryptionPlugin, InteractionRelay, StoragePlugin,
};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const PLUGIN_VERSION: &str = "1.0.0";

fn aead_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretsError::Failed(format!("invalid key: {e}")))?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SecretsError::Failed(format!("encryption failed: {e}")))?;
    let mut out = nonce_bytes.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn aead_decrypt(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(SecretsError::Failed("ciphertext too short".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretsError::Failed(format!("invalid key: {e}")))?;
    let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
    cipher.decrypt(nonce, &sealed[NONCE_SIZE..]).map_err(|_| {
        SecretsError::IncorrectAuthenticationCode("decryption failed: key mismatch".into())
    })
}

fn derive_key(code: &[u8], salt: &[u8], domain: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), code);
    let mut key = Zeroizing::new(vec![0u8; KEY_SIZE]);
    hk.expand(domain, &mut key)
        .map_err(|e| SecretsError::Failed(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Simple lock-code state shared by the lockable reference plugins.
#[derive(Default)]
struct LockState {
    code: Mutex<Vec<u8>>,
    locked: AtomicBool,
}

impl LockState {
    fn set_code(&self, old: &[u8], new: &[u8]) -> Result<()> {
        let mut code = self.code.lock();
        if code.as_slice() != old {
            return Err(SecretsError::IncorrectAuthenticationCode(
                "old lock code does not match".into(),
            ));
        }
        *code = new.to_vec();
        Ok(())
    }

    fn unlock(&self, attempt: &[u8]) -> Result<()> {
        if self.code.lock().as_slice() == attempt {
            self.locked.store(false, Ordering::Release);
            Ok(())
        } else {
            Err(SecretsError::IncorrectAuthenticationCode(
                "lock code does not match".into(),
            ))
        }
    }

    fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Plain storage
// ---------------------------------------------------------------------------

/// In-memory storage plugin holding opaque ciphertext records.
pub struct MemoryStoragePlugin {
    name: String,
    collections: RwLock<HashMap<String, HashMap<String, EncryptedRecord>>>,
    lock_state: LockState,
    fail_create_collection: AtomicBool,
    fail_set_secret: AtomicBool,
    remove_collection_delay_ms: AtomicU64,
}

impl MemoryStoragePlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
            lock_state: LockState::default(),
            fail_create_collection: AtomicBool::new(false),
            fail_set_secret: AtomicBool::new(false),
            remove_collection_delay_ms: AtomicU64::new(0),
        }
    }

    /// Make subsequent `create_collection` calls fail, for recovery tests.
    pub fn set_fail_create_collection(&self, fail: bool) {
        self.fail_create_collection.store(fail, Ordering::Release);
    }

    /// Make subsequent `set_secret` calls fail, for recovery tests.
    pub fn set_fail_set_secret(&self, fail: bool) {
        self.fail_set_secret.store(fail, Ordering::Release);
    }

    /// Stall `remove_collection` on the worker pool, to widen the window in
    /// which a concurrent request observes the collection as busy.
    pub fn set_remove_collection_delay_ms(&self, delay_ms: u64) {
        self.remove_collection_delay_ms.store(delay_ms, Ordering::Release);
    }

    fn check_usable(&self) -> Result<()> {
        if self.lock_state.is_locked() {
            return Err(SecretsError::Failed(format!(
                "storage plugin {} is locked",
                self.name
            )));
        }
        Ok(())
    }
}

impl StoragePlugin for MemoryStoragePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        PLUGIN_VERSION
    }

    fn create_collection(&self, collection_name: &str) -> Result<()> {
        self.check_usable()?;
        if self.fail_create_collection.load(Ordering::Acquire) {
            return Err(SecretsError::Failed(format!(
                "storage plugin {} failed to create collection {collection_name}",
                self.name
            )));
        }
        let mut collections = self.collections.write();
        if collections.contains_key(collection_name) {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_string(),
            ));
        }
        collections.insert(collection_name.to_string(), HashMap::new());
        Ok(())
    }

    fn remove_collection(&self, collection_name: &str) -> Result<()> {
        self.check_usable()?;
        let delay_ms = self.remove_collection_delay_ms.load(Ordering::Acquire);
        if delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay_ms));
        }
        self.collections.write().remove(collection_name);
        Ok(())
    }

    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        record: EncryptedRecord,
    ) -> Result<()> {
        self.check_usable()?;
        if self.fail_set_secret.load(Ordering::Acquire) {
            return Err(SecretsError::Failed(format!(
                "storage plugin {} failed to store secret",
                self.name
            )));
        }
        let mut collections = self.collections.write();
        // The standalone bucket is implicit; it materializes on first write.
        let records = collections.entry(collection_name.to_string()).or_default();
        records.insert(hashed_secret_name.to_string(), record);
        Ok(())
    }

    fn get_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> Result<EncryptedRecord> {
        self.check_usable()?;
        let collections = self.collections.read();
        collections
            .get(collection_name)
            .and_then(|records| records.get(hashed_secret_name))
            .cloned()
            .ok_or_else(|| SecretsError::InvalidSecret("no such secret".into()))
    }

    fn remove_secret(&self, collection_name: &str, hashed_secret_name: &str) -> Result<()> {
        self.check_usable()?;
        let mut collections = self.collections.write();
        if let Some(records) = collections.get_mut(collection_name) {
            records.remove(hashed_secret_name);
        }
        Ok(())
    }

    fn find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.check_usable()?;
        let collections = self.collections.read();
        let Some(records) = collections.get(collection_name) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<(String, Vec<u8>)> = records
            .iter()
            .filter(|(_, record)| operator.matches(filter, &record.filter_data))
            .map(|(hashed, record)| (hashed.clone(), record.name_ciphertext.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches)
    }

    fn reencrypt_secrets(
        &self,
        collection_name: Option<&str>,
        hashed_secret_names: &[String],
        old_key: &[u8],
        new_key: &[u8],
        encryption: &dyn EncryptionPlugin,
    ) -> Result<()> {
        self.check_usable()?;
        let mut collections = self.collections.write();
        let (collection, targets): (&str, Vec<String>) = match collection_name {
            Some(name) => {
                let records = collections
                    .get(name)
                    .ok_or_else(|| SecretsError::InvalidCollection(name.to_string()))?;
                let targets = if hashed_secret_names.is_empty() {
                    records.keys().cloned().collect()
                } else {
                    hashed_secret_names.to_vec()
                };
                (name, targets)
            },
            None => ("standalone", hashed_secret_names.to_vec()),
        };

        let Some(records) = collections.get_mut(collection) else {
            return Ok(());
        };
        for hashed in &targets {
            let Some(record) = records.get_mut(hashed) else {
                continue;
            };
            let name = encryption.decrypt(&record.name_ciphertext, old_key)?;
            let data = encryption.decrypt(&record.data_ciphertext, old_key)?;
            record.name_ciphertext = encryption.encrypt(&name, new_key)?;
            record.data_ciphertext = encryption.encrypt(&data, new_key)?;
        }
        Ok(())
    }

    fn supports_locking(&self) -> bool {
        true
    }

    fn lock(&self) -> Result<()> {
        self.lock_state.lock();
        Ok(())
    }

    fn unlock(&self, lock_code: &[u8]) -> Result<()> {
        self.lock_state.unlock(lock_code)
    }

    fn set_lock_code(&self, old_lock_code: &[u8], new_lock_code: &[u8]) -> Result<()> {
        self.lock_state.set_code(old_lock_code, new_lock_code)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encryption plugin: HKDF-SHA256 key derivation, AES-256-GCM transform with
/// the nonce prepended to the ciphertext.
pub struct HkdfAesEncryptionPlugin {
    name: String,
}

impl HkdfAesEncryptionPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EncryptionPlugin for HkdfAesEncryptionPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        PLUGIN_VERSION
    }

    fn derive_key_from_code(
        &self,
        authentication_code: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        derive_key(authentication_code, salt, b"collection unlock key v1")
    }

    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        aead_encrypt(key, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        aead_decrypt(key, ciphertext)
    }
}

// ---------------------------------------------------------------------------
// Fused encrypted storage
// ---------------------------------------------------------------------------

struct FusedRecord {
    secret_name: String,
    filter_data: FilterData,
    /// Data sealed under the collection key.
    data_ciphertext: Vec<u8>,
}

struct FusedCollection {
    /// Canary sealed under the collection key; proves key possession on unlock.
    canary: Vec<u8>,
    /// Present while the collection is unlocked.
    unlock_key: Option<Zeroizing<Vec<u8>>>,
    records: HashMap<String, FusedRecord>,
}

struct StandaloneRecord {
    secret_name: String,
    filter_data: FilterData,
    data_ciphertext: Vec<u8>,
}

/// Fused encrypted-storage plugin: owns per-collection lock state, encrypts
/// its own records, and stores standalone records sealed per-secret.
pub struct MemoryEncryptedStoragePlugin {
    name: String,
    collections: Mutex<HashMap<String, FusedCollection>>,
    standalone: Mutex<HashMap<String, StandaloneRecord>>,
    lock_state: LockState,
    fail_create_collection: AtomicBool,
}

impl MemoryEncryptedStoragePlugin {
    const CANARY: &'static [u8] = b"fused-collection-canary-v1";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Mutex::new(HashMap::new()),
            standalone: Mutex::new(HashMap::new()),
            lock_state: LockState::default(),
            fail_create_collection: AtomicBool::new(false),
        }
    }

    /// Make subsequent `create_collection` calls fail, for recovery tests.
    pub fn set_fail_create_collection(&self, fail: bool) {
        self.fail_create_collection.store(fail, Ordering::Release);
    }

    fn ensure_unlocked(
        collection_name: &str,
        state: &mut FusedCollection,
        key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        match &state.unlock_key {
            Some(unlock_key) => Ok(unlock_key.clone()),
            None => {
                if key.is_empty() {
                    return Err(SecretsError::CollectionLocked(collection_name.to_string()));
                }
                aead_decrypt(key, &state.canary).map_err(|_| {
                    SecretsError::IncorrectAuthenticationCode(format!(
                        "key does not unlock collection {collection_name}"
                    ))
                })?;
                let unlock_key = Zeroizing::new(key.to_vec());
                state.unlock_key = Some(unlock_key.clone());
                Ok(unlock_key)
            },
        }
    }
}

impl EncryptedStoragePlugin for MemoryEncryptedStoragePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        PLUGIN_VERSION
    }

    fn create_collection(&self, collection_name: &str, key: &[u8]) -> Result<()> {
        if self.fail_create_collection.load(Ordering::Acquire) {
            return Err(SecretsError::Failed(format!(
                "encrypted storage plugin {} failed to create collection {collection_name}",
                self.name
            )));
        }
        let mut collections = self.collections.lock();
        if collections.contains_key(collection_name) {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_string(),
            ));
        }
        let canary = aead_encrypt(key, Self::CANARY)?;
        collections.insert(
            collection_name.to_string(),
            FusedCollection {
                canary,
                unlock_key: Some(Zeroizing::new(key.to_vec())),
                records: HashMap::new(),
            },
        );
        Ok(())
    }

    fn remove_collection(&self, collection_name: &str) -> Result<()> {
        self.collections.lock().remove(collection_name);
        Ok(())
    }

    fn is_collection_locked(&self, collection_name: &str) -> Result<bool> {
        let collections = self.collections.lock();
        let state = collections
            .get(collection_name)
            .ok_or_else(|| SecretsError::InvalidCollection(collection_name.to_string()))?;
        Ok(state.unlock_key.is_none())
    }

    fn derive_key_from_code(
        &self,
        authentication_code: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        derive_key(authentication_code, salt, b"fused collection unlock key v1")
    }

    fn unlock_collection_and_store_secret(
        &self,
        secret: &Secret,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<()> {
        let collection_name = secret.identifier.collection_name.clone();
        let mut collections = self.collections.lock();
        let state = collections
            .get_mut(&collection_name)
            .ok_or_else(|| SecretsError::InvalidCollection(collection_name.clone()))?;
        let unlock_key = Self::ensure_unlocked(&collection_name, state, key)?;
        let data_ciphertext = aead_encrypt(&unlock_key, &secret.data)?;
        state.records.insert(
            hashed_secret_name.to_string(),
            FusedRecord {
                secret_name: secret.identifier.name.clone(),
                filter_data: secret.filter_data.clone(),
                data_ciphertext,
            },
        );
        Ok(())
    }

    fn unlock_collection_and_read_secret(
        &self,
        identifier: &SecretIdentifier,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<Secret> {
        let mut collections = self.collections.lock();
        let state = collections
            .get_mut(&identifier.collection_name)
            .ok_or_else(|| SecretsError::InvalidCollection(identifier.collection_name.clone()))?;
        let unlock_key = Self::ensure_unlocked(&identifier.collection_name, state, key)?;
        let record = state
            .records
            .get(hashed_secret_name)
            .ok_or_else(|| SecretsError::InvalidSecret(identifier.name.clone()))?;
        let data = aead_decrypt(&unlock_key, &record.data_ciphertext)?;
        Ok(Secret {
            identifier: SecretIdentifier::new(&record.secret_name, &identifier.collection_name),
            data,
            filter_data: record.filter_data.clone(),
        })
    }

    fn unlock_collection_and_remove_secret(
        &self,
        identifier: &SecretIdentifier,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<()> {
        let mut collections = self.collections.lock();
        let state = collections
            .get_mut(&identifier.collection_name)
            .ok_or_else(|| SecretsError::InvalidCollection(identifier.collection_name.clone()))?;
        Self::ensure_unlocked(&identifier.collection_name, state, key)?;
        state
            .records
            .remove(hashed_secret_name)
            .ok_or_else(|| SecretsError::InvalidSecret(identifier.name.clone()))?;
        Ok(())
    }

    fn unlock_and_find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
        key: &[u8],
    ) -> Result<Vec<SecretIdentifier>> {
        let mut collections = self.collections.lock();
        let state = collections
            .get_mut(collection_name)
            .ok_or_else(|| SecretsError::InvalidCollection(collection_name.to_string()))?;
        Self::ensure_unlocked(collection_name, state, key)?;
        let mut identifiers: Vec<SecretIdentifier> = state
            .records
            .values()
            .filter(|record| operator.matches(filter, &record.filter_data))
            .map(|record| SecretIdentifier::new(&record.secret_name, collection_name))
            .collect();
        identifiers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(identifiers)
    }

    fn access_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        key: &[u8],
    ) -> Result<Secret> {
        let standalone = self.standalone.lock();
        let record = standalone
            .get(hashed_secret_name)
            .ok_or_else(|| SecretsError::InvalidSecret("no such standalone secret".into()))?;
        let data = aead_decrypt(key, &record.data_ciphertext)?;
        Ok(Secret {
            identifier: SecretIdentifier::new(&record.secret_name, collection_name),
            data,
            filter_data: record.filter_data.clone(),
        })
    }

    fn set_secret(
        &self,
        _collection_name: &str,
        hashed_secret_name: &str,
        secret: &Secret,
        key: &[u8],
    ) -> Result<()> {
        let data_ciphertext = aead_encrypt(key, &secret.data)?;
        self.standalone.lock().insert(
            hashed_secret_name.to_string(),
            StandaloneRecord {
                secret_name: secret.identifier.name.clone(),
                filter_data: secret.filter_data.clone(),
                data_ciphertext,
            },
        );
        Ok(())
    }

    fn unlock_and_remove_secret(
        &self,
        _collection_name: &str,
        hashed_secret_name: &str,
        _uses_device_lock: bool,
        _key: &[u8],
    ) -> Result<()> {
        self.standalone
            .lock()
            .remove(hashed_secret_name)
            .ok_or_else(|| SecretsError::InvalidSecret("no such standalone secret".into()))?;
        Ok(())
    }

    fn unlock_collection_and_reencrypt(
        &self,
        collection_name: &str,
        old_key: &[u8],
        new_key: &[u8],
        _uses_device_lock: bool,
    ) -> Result<()> {
        let mut collections = self.collections.lock();
        let state = collections
            .get_mut(collection_name)
            .ok_or_else(|| SecretsError::InvalidCollection(collection_name.to_string()))?;
        aead_decrypt(old_key, &state.canary).map_err(|_| {
            SecretsError::IncorrectAuthenticationCode(format!(
                "old key does not unlock collection {collection_name}"
            ))
        })?;
        for record in state.records.values_mut() {
            let data = aead_decrypt(old_key, &record.data_ciphertext)?;
            record.data_ciphertext = aead_encrypt(new_key, &data)?;
        }
        state.canary = aead_encrypt(new_key, Self::CANARY)?;
        if state.unlock_key.is_some() {
            state.unlock_key = Some(Zeroizing::new(new_key.to_vec()));
        }
        Ok(())
    }

    fn modify_master_lock(
        &self,
        old_device_lock_key: &[u8],
        new_device_lock_key: &[u8],
    ) -> Result<()> {
        // Standalone records sealed under the old device lock key follow the
        // rekey; custom-lock records fail the trial decrypt and are skipped.
        let mut standalone = self.standalone.lock();
        for record in standalone.values_mut() {
            if let Ok(data) = aead_decrypt(old_device_lock_key, &record.data_ciphertext) {
                record.data_ciphertext = aead_encrypt(new_device_lock_key, &data)?;
            }
        }
        Ok(())
    }

    fn master_unlock(&self, device_lock_key: &[u8]) -> Result<()> {
        let mut collections = self.collections.lock();
        for state in collections.values_mut() {
            if state.unlock_key.is_none() && aead_decrypt(device_lock_key, &state.canary).is_ok() {
                state.unlock_key = Some(Zeroizing::new(device_lock_key.to_vec()));
            }
        }
        Ok(())
    }

    fn master_lock(&self) -> Result<()> {
        let mut collections = self.collections.lock();
        for state in collections.values_mut() {
            state.unlock_key = None;
        }
        Ok(())
    }

    fn supports_locking(&self) -> bool {
        true
    }

    fn lock(&self) -> Result<()> {
        self.lock_state.lock();
        Ok(())
    }

    fn unlock(&self, lock_code: &[u8]) -> Result<()> {
        self.lock_state.unlock(lock_code)
    }

    fn set_lock_code(&self, old_lock_code: &[u8], new_lock_code: &[u8]) -> Result<()> {
        self.lock_state.set_code(old_lock_code, new_lock_code)
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

enum ScriptedResponse {
    Input(Vec<u8>),
    Cancel,
}

/// Scripted authentication plugin: prompts are answered from a queue and
/// delivered asynchronously through the relay, the way a real UI process
/// would answer on its own schedule.
pub struct TestAuthenticationPlugin {
    name: String,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    prompts: Mutex<Vec<InteractionParameters>>,
    application_specific: AtomicBool,
    lockable: AtomicBool,
    lock_state: LockState,
}

impl TestAuthenticationPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            application_specific: AtomicBool::new(false),
            lockable: AtomicBool::new(false),
            lock_state: LockState::default(),
        }
    }

    /// Queue bytes to answer the next prompt with.
    pub fn enqueue_input(&self, input: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .push_back(ScriptedResponse::Input(input.into()));
    }

    /// Queue a user cancellation for the next prompt.
    pub fn enqueue_cancel(&self) {
        self.responses.lock().push_back(ScriptedResponse::Cancel);
    }

    /// Prompts shown so far, in order.
    pub fn prompts(&self) -> Vec<InteractionParameters> {
        self.prompts.lock().clone()
    }

    /// Declare the plugin as requiring in-process application interaction.
    pub fn set_application_specific(&self, value: bool) {
        self.application_specific.store(value, Ordering::Release);
    }

    /// Toggle whether the plugin reports `supports_locking`.
    pub fn set_lockable(&self, value: bool) {
        self.lockable.store(value, Ordering::Release);
    }
}

impl AuthenticationPlugin for TestAuthenticationPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        PLUGIN_VERSION
    }

    fn authentication_types(&self) -> AuthenticationTypes {
        if self.application_specific.load(Ordering::Acquire) {
            AuthenticationTypes::APPLICATION_SPECIFIC
        } else {
            AuthenticationTypes::SYSTEM_DEFAULT
        }
    }

    fn begin_user_input_interaction(
        &self,
        caller_pid: u32,
        request_id: u64,
        params: &InteractionParameters,
        _interaction_service_address: &str,
        relay: InteractionRelay,
    ) -> Result<()> {
        self.prompts.lock().push(params.clone());
        let response = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| SecretsError::Failed("no scripted response available".into()))?;

        std::thread::spawn(move || {
            let result = match response {
                ScriptedResponse::Input(bytes) => Ok(bytes),
                ScriptedResponse::Cancel => Err(SecretsError::InteractionCanceled(
                    "user canceled the interaction view".into(),
                )),
            };
            relay.user_input_completed(caller_pid, request_id, result);
        });
        Ok(())
    }

    fn supports_locking(&self) -> bool {
        self.lockable.load(Ordering::Acquire)
    }

    fn lock(&self) -> bool {
        self.lock_state.lock();
        true
    }

    fn unlock(&self, lock_code: &[u8]) -> bool {
        self.lock_state.unlock(lock_code).is_ok()
    }

    fn set_lock_code(&self, old_lock_code: &[u8], new_lock_code: &[u8]) -> bool {
        self.lock_state.set_code(old_lock_code, new_lock_code).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use secrets_core::ErrorCode;

    use super::*;

    fn record_for(
        enc: &HkdfAesEncryptionPlugin,
        name: &str,
        data: &[u8],
        key: &[u8],
        filters: &[(&str, &str)],
    ) -> EncryptedRecord {
        EncryptedRecord {
            name_ciphertext: enc.encrypt(name.as_bytes(), key).unwrap(),
            data_ciphertext: enc.encrypt(data, key).unwrap(),
            filter_data: filters
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_encryption_round_trip() {
        let enc = HkdfAesEncryptionPlugin::new("enc");
        let key = enc.derive_key_from_code(b"pw", b"salt-1234").unwrap();

        let ciphertext = enc.encrypt(b"payload", &key).unwrap();
        assert_ne!(&ciphertext[NONCE_SIZE..], b"payload");
        assert_eq!(enc.decrypt(&ciphertext, &key).unwrap(), b"payload");
    }

    #[test]
    fn test_decrypt_with_wrong_key_reports_mismatch() {
        let enc = HkdfAesEncryptionPlugin::new("enc");
        let key_a = enc.derive_key_from_code(b"pw", b"salt-1234").unwrap();
        let key_b = enc.derive_key_from_code(b"other", b"salt-1234").unwrap();

        let ciphertext = enc.encrypt(b"payload", &key_a).unwrap();
        let err = enc.decrypt(&ciphertext, &key_b).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncorrectAuthenticationCode);
    }

    #[test]
    fn test_storage_store_find_remove() {
        let storage = MemoryStoragePlugin::new("store");
        let enc = HkdfAesEncryptionPlugin::new("enc");
        let key = enc.derive_key_from_code(b"pw", b"salt-1234").unwrap();

        storage.create_collection("wallet").unwrap();
        storage
            .set_secret(
                "wallet",
                "h1",
                record_for(&enc, "seed", b"abc", &key, &[("type", "mnemonic")]),
            )
            .unwrap();
        storage
            .set_secret(
                "wallet",
                "h2",
                record_for(&enc, "pin", b"1234", &key, &[("type", "pin")]),
            )
            .unwrap();

        let filter: FilterData = [("type".to_string(), "mnemonic".to_string())].into();
        let found = storage
            .find_secrets("wallet", &filter, FilterOperator::And)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "h1");
        assert_eq!(enc.decrypt(&found[0].1, &key).unwrap(), b"seed");

        storage.remove_secret("wallet", "h1").unwrap();
        assert!(storage.get_secret("wallet", "h1").is_err());
    }

    #[test]
    fn test_storage_fault_injection() {
        let storage = MemoryStoragePlugin::new("store");
        storage.set_fail_create_collection(true);
        assert!(storage.create_collection("bad").is_err());

        storage.set_fail_create_collection(false);
        storage.create_collection("bad").unwrap();
    }

    #[test]
    fn test_storage_reencrypt_collection() {
        let storage = MemoryStoragePlugin::new("store");
        let enc = HkdfAesEncryptionPlugin::new("enc");
        let old_key = enc.derive_key_from_code(b"old", b"salt-1234").unwrap();
        let new_key = enc.derive_key_from_code(b"new", b"salt-1234").unwrap();

        storage.create_collection("notes").unwrap();
        storage
            .set_secret("notes", "h1", record_for(&enc, "memo", b"text", &old_key, &[]))
            .unwrap();

        storage
            .reencrypt_secrets(Some("notes"), &[], &old_key, &new_key, &enc)
            .unwrap();

        let record = storage.get_secret("notes", "h1").unwrap();
        assert_eq!(enc.decrypt(&record.data_ciphertext, &new_key).unwrap(), b"text");
        assert!(enc.decrypt(&record.data_ciphertext, &old_key).is_err());
    }

    #[test]
    fn test_fused_collection_lock_cycle() {
        let plugin = MemoryEncryptedStoragePlugin::new("encstore");
        let key = plugin.derive_key_from_code(b"pw", b"salt-1234").unwrap();

        plugin.create_collection("wallet", &key).unwrap();
        assert!(!plugin.is_collection_locked("wallet").unwrap());

        let secret = Secret::new(SecretIdentifier::new("seed", "wallet"), b"abc".to_vec());
        plugin
            .unlock_collection_and_store_secret(&secret, "h1", &[])
            .unwrap();

        plugin.master_lock().unwrap();
        assert!(plugin.is_collection_locked("wallet").unwrap());

        // Reading while locked with no key fails; with the key it unlocks.
        let identifier = SecretIdentifier::new("seed", "wallet");
        let err = plugin
            .unlock_collection_and_read_secret(&identifier, "h1", &[])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CollectionLocked);

        let read = plugin
            .unlock_collection_and_read_secret(&identifier, "h1", &key)
            .unwrap();
        assert_eq!(read.data, b"abc");
        assert!(!plugin.is_collection_locked("wallet").unwrap());
    }

    #[test]
    fn test_fused_wrong_key_rejected() {
        let plugin = MemoryEncryptedStoragePlugin::new("encstore");
        let key = plugin.derive_key_from_code(b"pw", b"salt-1234").unwrap();
        let wrong = plugin.derive_key_from_code(b"oops", b"salt-1234").unwrap();

        plugin.create_collection("wallet", &key).unwrap();
        plugin.master_lock().unwrap();

        let identifier = SecretIdentifier::new("seed", "wallet");
        let err = plugin
            .unlock_collection_and_read_secret(&identifier, "h1", &wrong)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncorrectAuthenticationCode);
    }

    #[test]
    fn test_fused_reencrypt_preserves_data() {
        let plugin = MemoryEncryptedStoragePlugin::new("encstore");
        let old_key = plugin.derive_key_from_code(b"old", b"salt-1234").unwrap();
        let new_key = plugin.derive_key_from_code(b"new", b"salt-1234").unwrap();

        plugin.create_collection("wallet", &old_key).unwrap();
        let secret = Secret::new(SecretIdentifier::new("seed", "wallet"), b"abc".to_vec());
        plugin
            .unlock_collection_and_store_secret(&secret, "h1", &[])
            .unwrap();

        plugin
            .unlock_collection_and_reencrypt("wallet", &old_key, &new_key, true)
            .unwrap();
        plugin.master_lock().unwrap();

        let identifier = SecretIdentifier::new("seed", "wallet");
        let read = plugin
            .unlock_collection_and_read_secret(&identifier, "h1", &new_key)
            .unwrap();
        assert_eq!(read.data, b"abc");
    }

    #[test]
    fn test_fused_standalone_records() {
        let plugin = MemoryEncryptedStoragePlugin::new("encstore");
        let key = plugin.derive_key_from_code(b"dl", b"salt-1234").unwrap();

        let secret = Secret::new(SecretIdentifier::standalone("pin"), b"1234".to_vec());
        plugin.set_secret("standalone", "h1", &secret, &key).unwrap();

        let read = plugin.access_secret("standalone", "h1", &key).unwrap();
        assert_eq!(read.data, b"1234");
        assert_eq!(read.identifier.name, "pin");

        plugin
            .unlock_and_remove_secret("standalone", "h1", true, &key)
            .unwrap();
        assert!(plugin.access_secret("standalone", "h1", &key).is_err());
    }

    #[test]
    fn test_fused_modify_master_lock_rekeys_standalone() {
        let plugin = MemoryEncryptedStoragePlugin::new("encstore");
        let old_key = plugin.derive_key_from_code(b"old", b"salt-1234").unwrap();
        let new_key = plugin.derive_key_from_code(b"new", b"salt-1234").unwrap();

        let secret = Secret::new(SecretIdentifier::standalone("pin"), b"1234".to_vec());
        plugin
            .set_secret("standalone", "h1", &secret, &old_key)
            .unwrap();

        plugin.modify_master_lock(&old_key, &new_key).unwrap();

        assert!(plugin.access_secret("standalone", "h1", &old_key).is_err());
        assert_eq!(
            plugin.access_secret("standalone", "h1", &new_key).unwrap().data,
            b"1234"
        );
    }

    #[test]
    fn test_auth_plugin_delivers_scripted_input() {
        let plugin = TestAuthenticationPlugin::new("auth");
        plugin.enqueue_input(b"pw".to_vec());

        let (tx, rx) = mpsc::channel();
        let relay = InteractionRelay::new(move |event| {
            if let crate::traits::InteractionEvent::UserInputCompleted { result, .. } = event {
                tx.send(result).unwrap();
            }
        });

        let params = InteractionParameters::new(
            secrets_core::InteractionOperation::CreateCollection,
        );
        plugin
            .begin_user_input_interaction(1, 7, &params, "", relay)
            .unwrap();

        let result = rx.recv().unwrap();
        assert_eq!(result.unwrap(), b"pw");
        assert_eq!(plugin.prompts().len(), 1);
    }

    #[test]
    fn test_auth_plugin_cancel_and_exhaustion() {
        let plugin = TestAuthenticationPlugin::new("auth");
        plugin.enqueue_cancel();

        let (tx, rx) = mpsc::channel();
        let relay = InteractionRelay::new(move |event| {
            if let crate::traits::InteractionEvent::UserInputCompleted { result, .. } = event {
                tx.send(result).unwrap();
            }
        });

        let params =
            InteractionParameters::new(secrets_core::InteractionOperation::ReadSecret);
        plugin
            .begin_user_input_interaction(1, 8, &params, "", relay.clone())
            .unwrap();
        let result = rx.recv().unwrap();
        assert_eq!(result.unwrap_err().code(), ErrorCode::InteractionCanceled);

        // No scripted response left: beginning the interaction fails.
        assert!(plugin
            .begin_user_input_interaction(1, 9, &params, "", relay)
            .is_err());
    }

    #[test]
    fn test_auth_plugin_lock_code() {
        let plugin = TestAuthenticationPlugin::new("auth");
        assert!(!plugin.supports_locking());
        plugin.set_lockable(true);
        assert!(plugin.supports_locking());

        assert!(AuthenticationPlugin::set_lock_code(&plugin, b"", b"code"));
        assert!(!AuthenticationPlugin::set_lock_code(&plugin, b"wrong", b"other"));
        assert!(AuthenticationPlugin::lock(&plugin));
        assert!(!AuthenticationPlugin::unlock(&plugin, b"wrong"));
        assert!(AuthenticationPlugin::unlock(&plugin, b"code"));
    }
}
