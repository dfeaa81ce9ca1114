// SPDX-License-Identifier: MIT OR Apache-2.0
//! Master lock change: bookkeeping re-key, device-locked data sweep, and the
//! forget/provide lock-code cycle.

use integration_tests::{build_broker, request_id, TestBroker, APP_A_PID, PLATFORM_PID};
use secrets_core::{
    AccessControlMode, ErrorCode, InteractionOperation, InteractionParameters, LockCodeTarget,
    Secret, SecretIdentifier, UnlockSemantic, UserInteractionMode,
};

fn lock_params() -> InteractionParameters {
    InteractionParameters::new(InteractionOperation::ModifyLockDatabase)
}

async fn modify_master_lock(broker: &TestBroker, old: &[u8], new: &[u8]) -> secrets_core::Result<()> {
    broker.auth.enqueue_input(old.to_vec());
    broker.auth.enqueue_input(new.to_vec());
    broker
        .processor
        .modify_lock_code(
            PLATFORM_PID,
            request_id(),
            LockCodeTarget::BookkeepingDatabase,
            lock_params(),
            UserInteractionMode::System,
            "",
        )
        .await
}

async fn seed_collections(broker: &TestBroker) {
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "fusedc",
            "encstore",
            "encstore",
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .await
        .unwrap();
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "splitc",
            "store",
            "enc",
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .await
        .unwrap();
    for collection in ["fusedc", "splitc"] {
        broker
            .processor
            .set_collection_secret(
                APP_A_PID,
                request_id(),
                Secret::new(SecretIdentifier::new("seed", collection), b"abc".to_vec()),
                None,
                UserInteractionMode::System,
                "",
            )
            .await
            .unwrap();
    }
}

async fn read_seed(broker: &TestBroker, collection: &str) -> secrets_core::Result<Vec<u8>> {
    broker
        .processor
        .get_collection_secret(
            APP_A_PID,
            request_id(),
            SecretIdentifier::new("seed", collection),
            UserInteractionMode::System,
            "",
        )
        .await
        .map(|secret| secret.data)
}

#[tokio::test]
async fn test_rekey_preserves_device_locked_secrets() {
    let broker = build_broker();
    seed_collections(&broker).await;

    // A standalone device-locked secret joins the sweep.
    broker
        .processor
        .set_standalone_device_lock_secret(
            APP_A_PID,
            request_id(),
            "store",
            "enc",
            Secret::new(SecretIdentifier::standalone("pin"), b"1234".to_vec()),
            None,
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    modify_master_lock(&broker, b"old", b"new").await.unwrap();

    assert_eq!(read_seed(&broker, "fusedc").await.unwrap(), b"abc");
    assert_eq!(read_seed(&broker, "splitc").await.unwrap(), b"abc");
    let pin = broker
        .processor
        .get_standalone_secret(APP_A_PID, request_id(), "pin", UserInteractionMode::System, "")
        .await
        .unwrap();
    assert_eq!(pin.data, b"1234");

    // New writes land under the new device lock key.
    broker
        .processor
        .set_collection_secret(
            APP_A_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("post", "splitc"), b"after".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rekey_rejects_wrong_old_code() {
    let broker = build_broker();
    seed_collections(&broker).await;

    let err = modify_master_lock(&broker, b"not-the-code", b"new").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DaemonLocked);

    // Nothing rotated; data remains readable.
    assert_eq!(read_seed(&broker, "splitc").await.unwrap(), b"abc");
}

#[tokio::test]
async fn test_rekey_requires_platform_application() {
    let broker = build_broker();

    let err = broker
        .processor
        .modify_lock_code(
            APP_A_PID,
            request_id(),
            LockCodeTarget::BookkeepingDatabase,
            lock_params(),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
}

#[tokio::test]
async fn test_forget_then_provide_cycle() {
    let broker = build_broker();
    seed_collections(&broker).await;

    modify_master_lock(&broker, b"old", b"new").await.unwrap();

    broker
        .processor
        .forget_lock_code(
            PLATFORM_PID,
            request_id(),
            LockCodeTarget::BookkeepingDatabase,
            lock_params(),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    // The daemon is sealed: metadata operations fail.
    let err = read_seed(&broker, "splitc").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DaemonLocked);

    // The outdated code no longer unlocks the database.
    broker.auth.enqueue_input(b"old".to_vec());
    let err = broker
        .processor
        .provide_lock_code(
            PLATFORM_PID,
            request_id(),
            LockCodeTarget::BookkeepingDatabase,
            lock_params(),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DaemonLocked);

    // The current code does.
    broker.auth.enqueue_input(b"new".to_vec());
    broker
        .processor
        .provide_lock_code(
            PLATFORM_PID,
            request_id(),
            LockCodeTarget::BookkeepingDatabase,
            lock_params(),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    assert_eq!(read_seed(&broker, "fusedc").await.unwrap(), b"abc");
    assert_eq!(read_seed(&broker, "splitc").await.unwrap(), b"abc");
}

#[tokio::test]
async fn test_lock_code_targets_for_rows_are_not_supported() {
    let broker = build_broker();

    for target in [
        LockCodeTarget::Collection("notes".into()),
        LockCodeTarget::StandaloneSecret("pin".into()),
    ] {
        let err = broker
            .processor
            .modify_lock_code(
                PLATFORM_PID,
                request_id(),
                target.clone(),
                lock_params(),
                UserInteractionMode::System,
                "",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);

        let err = broker
            .processor
            .provide_lock_code(
                PLATFORM_PID,
                request_id(),
                target.clone(),
                lock_params(),
                UserInteractionMode::System,
                "",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);

        let err = broker
            .processor
            .forget_lock_code(
                PLATFORM_PID,
                request_id(),
                target,
                lock_params(),
                UserInteractionMode::System,
                "",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }
}
