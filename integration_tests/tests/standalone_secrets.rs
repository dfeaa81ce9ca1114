// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standalone secret lifecycle across both lock flavors.

use std::time::Duration;

use integration_tests::{build_broker, request_id, TestBroker, APP_A_PID};
use secrets_core::{
    AccessControlMode, ErrorCode, FilterData, FilterOperator, InteractionOperation,
    InteractionParameters, Secret, SecretIdentifier, UnlockSemantic, UserInteractionMode,
};

async fn set_device_lock(broker: &TestBroker, name: &str, data: &[u8], storage: &str) {
    broker
        .processor
        .set_standalone_device_lock_secret(
            APP_A_PID,
            request_id(),
            storage,
            if storage == "encstore" { "encstore" } else { "enc" },
            Secret::new(SecretIdentifier::standalone(name), data.to_vec()),
            None,
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();
}

async fn get(broker: &TestBroker, name: &str) -> Vec<u8> {
    broker
        .processor
        .get_standalone_secret(APP_A_PID, request_id(), name, UserInteractionMode::System, "")
        .await
        .unwrap()
        .data
}

#[tokio::test]
async fn test_device_lock_round_trip_split_and_fused() {
    let broker = build_broker();
    set_device_lock(&broker, "pin", b"1234", "store").await;
    set_device_lock(&broker, "puk", b"9999", "encstore").await;

    assert_eq!(get(&broker, "pin").await, b"1234");
    assert_eq!(get(&broker, "puk").await, b"9999");

    // The identifier comes back in standalone form.
    let secret = broker
        .processor
        .get_standalone_secret(APP_A_PID, request_id(), "pin", UserInteractionMode::System, "")
        .await
        .unwrap();
    assert!(secret.identifier.is_standalone());
    assert_eq!(secret.identifier.name, "pin");
}

#[tokio::test]
async fn test_custom_lock_set_prompts_and_reads_back() {
    let broker = build_broker();
    broker.auth.enqueue_input(b"pw".to_vec());

    broker
        .processor
        .set_standalone_custom_lock_secret(
            APP_A_PID,
            request_id(),
            "store",
            "enc",
            "auth",
            Secret::new(SecretIdentifier::standalone("seed"), b"abc".to_vec()),
            None,
            UnlockSemantic::CustomLockKeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    let prompts = broker.auth.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].operation, InteractionOperation::StoreSecret);

    // The derived key is cached; the read needs no prompt.
    assert_eq!(get(&broker, "seed").await, b"abc");
}

#[tokio::test]
async fn test_custom_lock_timeout_relocks_standalone_secret() {
    let broker = build_broker();
    broker.auth.enqueue_input(b"pw".to_vec());
    broker
        .processor
        .set_standalone_custom_lock_secret(
            APP_A_PID,
            request_id(),
            "store",
            "enc",
            "auth",
            Secret::new(SecretIdentifier::standalone("seed"), b"abc".to_vec()),
            None,
            UnlockSemantic::CustomLockTimeoutRelock,
            300,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    assert_eq!(get(&broker, "seed").await, b"abc");

    tokio::time::sleep(Duration::from_millis(500)).await;

    let err = broker
        .processor
        .get_standalone_secret(APP_A_PID, request_id(), "seed", UserInteractionMode::Prevent, "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InteractionRequired);

    // A fresh passphrase prompt unlocks it again.
    broker.auth.enqueue_input(b"pw".to_vec());
    assert_eq!(get(&broker, "seed").await, b"abc");
}

#[tokio::test]
async fn test_lock_flavor_conversion_is_refused() {
    let broker = build_broker();
    broker.auth.enqueue_input(b"pw".to_vec());
    broker
        .processor
        .set_standalone_custom_lock_secret(
            APP_A_PID,
            request_id(),
            "store",
            "enc",
            "auth",
            Secret::new(SecretIdentifier::standalone("seed"), b"abc".to_vec()),
            None,
            UnlockSemantic::CustomLockKeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    // Overwriting a custom-lock secret with a device-lock one is refused.
    let err = broker
        .processor
        .set_standalone_device_lock_secret(
            APP_A_PID,
            request_id(),
            "store",
            "enc",
            Secret::new(SecretIdentifier::standalone("seed"), b"new".to_vec()),
            None,
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotSupported);
}

#[tokio::test]
async fn test_plugin_change_is_refused() {
    let broker = build_broker();
    set_device_lock(&broker, "pin", b"1234", "store").await;

    let err = broker
        .processor
        .set_standalone_device_lock_secret(
            APP_A_PID,
            request_id(),
            "encstore",
            "encstore",
            Secret::new(SecretIdentifier::standalone("pin"), b"5678".to_vec()),
            None,
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotSupported);
}

#[tokio::test]
async fn test_overwrite_same_plugin_updates_value() {
    let broker = build_broker();
    set_device_lock(&broker, "pin", b"1234", "store").await;
    set_device_lock(&broker, "pin", b"5678", "store").await;
    assert_eq!(get(&broker, "pin").await, b"5678");
}

#[tokio::test]
async fn test_delete_standalone_secret() {
    let broker = build_broker();
    set_device_lock(&broker, "pin", b"1234", "store").await;
    set_device_lock(&broker, "puk", b"9999", "encstore").await;

    for name in ["pin", "puk"] {
        broker
            .processor
            .delete_standalone_secret(APP_A_PID, request_id(), name, UserInteractionMode::System)
            .await
            .unwrap();
        let err = broker
            .processor
            .get_standalone_secret(APP_A_PID, request_id(), name, UserInteractionMode::System, "")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSecret, "secret {name}");
    }

    // Deleting a nonexistent secret succeeds vacuously.
    broker
        .processor
        .delete_standalone_secret(APP_A_PID, request_id(), "ghost", UserInteractionMode::System)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_data_collected_from_user() {
    let broker = build_broker();
    broker.auth.enqueue_input(b"typed".to_vec());

    broker
        .processor
        .set_standalone_device_lock_secret(
            APP_A_PID,
            request_id(),
            "store",
            "enc",
            Secret::new(SecretIdentifier::standalone("note"), Vec::new()),
            Some(InteractionParameters::new(InteractionOperation::RequestUserData)),
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    assert_eq!(get(&broker, "note").await, b"typed");
}

#[tokio::test]
async fn test_find_standalone_secrets_is_not_supported() {
    let broker = build_broker();
    let err = broker
        .processor
        .find_standalone_secrets(
            APP_A_PID,
            request_id(),
            FilterData::new(),
            FilterOperator::And,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotSupported);
}
