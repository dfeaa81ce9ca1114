// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-application access control.

use integration_tests::{build_broker, request_id, APP_A_PID, APP_B_PID};
use secrets_core::{
    AccessControlMode, ErrorCode, Secret, SecretIdentifier, UnlockSemantic, UserInteractionMode,
};

#[tokio::test]
async fn test_owner_only_rejects_other_applications() {
    let broker = build_broker();
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "priv",
            "store",
            "enc",
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .await
        .unwrap();
    broker
        .processor
        .set_collection_secret(
            APP_A_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("x", "priv"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    let err = broker
        .processor
        .get_collection_secret(
            APP_B_PID,
            request_id(),
            SecretIdentifier::new("x", "priv"),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    let err = broker
        .processor
        .set_collection_secret(
            APP_B_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("y", "priv"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    let err = broker
        .processor
        .delete_collection(APP_B_PID, request_id(), "priv", UserInteractionMode::System)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    // The owner still has full access.
    let secret = broker
        .processor
        .get_collection_secret(
            APP_A_PID,
            request_id(),
            SecretIdentifier::new("x", "priv"),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();
    assert_eq!(secret.data, b"v");
}

#[tokio::test]
async fn test_no_access_control_allows_other_applications() {
    let broker = build_broker();
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "shared",
            "store",
            "enc",
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::NoAccessControl,
        )
        .await
        .unwrap();
    broker
        .processor
        .set_collection_secret(
            APP_A_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("x", "shared"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    let secret = broker
        .processor
        .get_collection_secret(
            APP_B_PID,
            request_id(),
            SecretIdentifier::new("x", "shared"),
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();
    assert_eq!(secret.data, b"v");
}

#[tokio::test]
async fn test_system_access_control_is_not_supported_yet() {
    let broker = build_broker();
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "sysc",
            "store",
            "enc",
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::System,
        )
        .await
        .unwrap();

    // The access-control authority does not exist yet; operations against a
    // system-controlled collection refuse rather than guess.
    let err = broker
        .processor
        .set_collection_secret(
            APP_A_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("x", "sysc"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotSupported);
}

#[tokio::test]
async fn test_standalone_owner_only() {
    let broker = build_broker();
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

    let err = broker
        .processor
        .get_standalone_secret(APP_B_PID, request_id(), "pin", UserInteractionMode::System, "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    let err = broker
        .processor
        .delete_standalone_secret(APP_B_PID, request_id(), "pin", UserInteractionMode::System)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
}
