// SPDX-License-Identifier: MIT OR Apache-2.0
//! The interleave guard: at most one mutating request per collection.

use std::time::Duration;

use integration_tests::{build_broker, request_id, APP_A_PID};
use secrets_core::{
    AccessControlMode, ErrorCode, Secret, SecretIdentifier, UnlockSemantic, UserInteractionMode,
};

#[tokio::test(flavor = "multi_thread")]
async fn test_mutation_during_delete_is_interleaved() {
    let broker = build_broker();
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "notes",
            "store",
            "enc",
            UnlockSemantic::DeviceLockKeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .await
        .unwrap();

    // Stall the plugin-side removal so the collection stays busy while we
    // issue a concurrent mutation.
    broker.storage.set_remove_collection_delay_ms(400);
    let processor = broker.processor.clone();
    let delete = tokio::spawn(async move {
        processor
            .delete_collection(APP_A_PID, request_id(), "notes", UserInteractionMode::System)
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = broker
        .processor
        .set_collection_secret(
            APP_A_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("memo", "notes"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InterleavedRequest);
    assert!(err.is_retryable());

    delete.await.unwrap().unwrap();
    broker.storage.set_remove_collection_delay_ms(0);

    // The busy flag cleared with the delete; the collection can be recreated
    // and mutated again.
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "notes",
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
            Secret::new(SecretIdentifier::new("memo", "notes"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reads_are_not_serialized_by_the_guard() {
    let broker = build_broker();
    broker
        .processor
        .create_device_lock_collection(
            APP_A_PID,
            request_id(),
            "notes",
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
            Secret::new(SecretIdentifier::new("memo", "notes"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    // Concurrent reads all succeed; pure reads never take the busy flag.
    let mut readers = Vec::new();
    for _ in 0..8 {
        let processor = broker.processor.clone();
        readers.push(tokio::spawn(async move {
            processor
                .get_collection_secret(
                    APP_A_PID,
                    request_id(),
                    SecretIdentifier::new("memo", "notes"),
                    UserInteractionMode::System,
                    "",
                )
                .await
        }));
    }
    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap().data, b"v");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_distinct_collections_mutate_concurrently() {
    let broker = build_broker();
    for name in ["a", "b"] {
        broker
            .processor
            .create_device_lock_collection(
                APP_A_PID,
                request_id(),
                name,
                "store",
                "enc",
                UnlockSemantic::DeviceLockKeepUnlocked,
                AccessControlMode::OwnerOnly,
            )
            .await
            .unwrap();
    }

    broker.storage.set_remove_collection_delay_ms(300);
    let processor = broker.processor.clone();
    let delete = tokio::spawn(async move {
        processor
            .delete_collection(APP_A_PID, request_id(), "a", UserInteractionMode::System)
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Collection "b" is unaffected by "a" being busy.
    broker
        .processor
        .set_collection_secret(
            APP_A_PID,
            request_id(),
            Secret::new(SecretIdentifier::new("memo", "b"), b"v".to_vec()),
            None,
            UserInteractionMode::System,
            "",
        )
        .await
        .unwrap();

    delete.await.unwrap().unwrap();
}
