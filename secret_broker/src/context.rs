// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide key material, passed explicitly to the request processor.

use std::sync::atomic::{AtomicBool, Ordering};

use hkdf::Hkdf;
use parking_lot::Mutex;
use secrets_core::{Result, SecretsError};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Size of the process salt handed to plugin key derivation.
pub const SALT_SIZE: usize = 16;

const KEY_SIZE: usize = 32;

/// Sentinel lock code installed by "forget lock code": seals the database
/// until a subsequent "provide lock code".
pub(crate) const FORGET_SENTINEL: [u8; 64] = [0xff; 64];

/// Daemon-held key material: the device lock key and the bookkeeping lock
/// key, both derived from the master lock code, plus the process salt.
///
/// The keys rotate on master re-key and are never persisted.
pub struct DaemonContext {
    salt: Vec<u8>,
    device_lock_key: Mutex<Zeroizing<Vec<u8>>>,
    bkdb_lock_key: Mutex<Zeroizing<Vec<u8>>>,
    no_lock_code: AtomicBool,
    initialised: AtomicBool,
}

impl DaemonContext {
    pub fn new(salt: [u8; SALT_SIZE]) -> Self {
        Self {
            salt: salt.to_vec(),
            device_lock_key: Mutex::new(Zeroizing::new(Vec::new())),
            bkdb_lock_key: Mutex::new(Zeroizing::new(Vec::new())),
            no_lock_code: AtomicBool::new(false),
            initialised: AtomicBool::new(false),
        }
    }

    fn derive(&self, lock_code: &[u8], domain: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let hk = Hkdf::<Sha256>::new(Some(&self.salt), lock_code);
        let mut key = Zeroizing::new(vec![0u8; KEY_SIZE]);
        hk.expand(domain, &mut key)
            .map_err(|e| SecretsError::Unknown(format!("key derivation failed: {e}")))?;
        Ok(key)
    }

    /// Derive fresh device-lock and bookkeeping-lock keys from a lock code.
    pub fn initialise(&self, lock_code: &[u8]) -> Result<()> {
        let device = self.derive(lock_code, b"device lock key v1")?;
        let bkdb = self.derive(lock_code, b"bookkeeping lock key v1")?;
        *self.device_lock_key.lock() = device;
        *self.bkdb_lock_key.lock() = bkdb;
        self.initialised.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    /// Whether the given lock code derives the current bookkeeping lock key.
    pub fn test_lock_code(&self, lock_code: &[u8]) -> bool {
        match self.derive(lock_code, b"bookkeeping lock key v1") {
            Ok(candidate) => candidate.as_slice() == self.bkdb_lock_key.lock().as_slice(),
            Err(_) => false,
        }
    }

    /// Snapshot of the current device lock key.
    pub fn device_lock_key(&self) -> Zeroizing<Vec<u8>> {
        self.device_lock_key.lock().clone()
    }

    /// Snapshot of the current bookkeeping lock key.
    pub fn bkdb_lock_key(&self) -> Zeroizing<Vec<u8>> {
        self.bkdb_lock_key.lock().clone()
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Record whether the daemon was opened without a lock code, so a later
    /// `provide_lock_code` can unlock with the null code.
    pub fn set_no_lock_code(&self, value: bool) {
        self.no_lock_code.store(value, Ordering::Release);
    }

    pub fn no_lock_code(&self) -> bool {
        self.no_lock_code.load(Ordering::Acquire)
    }
}
