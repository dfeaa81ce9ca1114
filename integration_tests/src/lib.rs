// SPDX-License-Identifier: MIT OR Apache-2.0
//! Test harness for the secrets broker scenario tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use secret_broker::{BrokerConfig, DaemonContext, MappedIdentity, RequestProcessor, SALT_SIZE};
use secret_plugins::{
    HkdfAesEncryptionPlugin, MemoryEncryptedStoragePlugin, MemoryStoragePlugin, PluginRegistry,
    TestAuthenticationPlugin,
};
use secret_store::BookkeepingStore;

/// Pid registered as application A (`org.example.appA`).
pub const APP_A_PID: u32 = 100;
/// Pid registered as application B (`org.example.appB`).
pub const APP_B_PID: u32 = 200;
/// Pid registered as the platform application.
pub const PLATFORM_PID: u32 = 1;

/// The master lock code the broker starts out with.
pub const INITIAL_LOCK_CODE: &[u8] = b"old";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A fresh request id, unique across the test process.
pub fn request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// A broker wired against the reference plugins, with the bookkeeping store
/// initialised and unlocked under [`INITIAL_LOCK_CODE`].
pub struct TestBroker {
    pub processor: Arc<RequestProcessor>,
    pub store: Arc<BookkeepingStore>,
    pub context: Arc<DaemonContext>,
    pub storage: Arc<MemoryStoragePlugin>,
    pub encryption: Arc<HkdfAesEncryptionPlugin>,
    pub encrypted_storage: Arc<MemoryEncryptedStoragePlugin>,
    pub auth: Arc<TestAuthenticationPlugin>,
}

pub fn build_broker() -> TestBroker {
    let storage = Arc::new(MemoryStoragePlugin::new("store"));
    let encryption = Arc::new(HkdfAesEncryptionPlugin::new("enc"));
    let encrypted_storage = Arc::new(MemoryEncryptedStoragePlugin::new("encstore"));
    let auth = Arc::new(TestAuthenticationPlugin::new("auth"));

    let registry = Arc::new(
        PluginRegistry::builder()
            .with_storage(storage.clone())
            .with_encryption(encryption.clone())
            .with_crypto_storage(encrypted_storage.clone())
            .with_authentication(auth.clone())
            .build(),
    );

    let context = Arc::new(DaemonContext::new([7u8; SALT_SIZE]));
    context.initialise(INITIAL_LOCK_CODE).expect("derive initial keys");

    let store = Arc::new(BookkeepingStore::new());
    store
        .initialise(&context.bkdb_lock_key())
        .expect("initialise bookkeeping store");

    let identity = Arc::new(MappedIdentity::new());
    identity.register_application(APP_A_PID, "org.example.appA");
    identity.register_application(APP_B_PID, "org.example.appB");
    identity.register_platform_application(PLATFORM_PID);

    let config = BrokerConfig::default().with_default_authentication_plugin("auth");
    let processor = Arc::new(RequestProcessor::new(
        registry,
        store.clone(),
        context.clone(),
        identity,
        config,
    ));

    TestBroker {
        processor,
        store,
        context,
        storage,
        encryption,
        encrypted_storage,
        auth,
    }
}
