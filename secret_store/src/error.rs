// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store-level errors and their mapping onto client-facing error kinds.

use secrets_core::SecretsError;
use thiserror::Error;

/// Errors produced by the bookkeeping store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// The store has not been initialised with a lock key.
    #[error("store is not initialised")]
    NotInitialised,

    /// The store is locked; row operations are unavailable.
    #[error("store is locked")]
    Locked,

    /// The supplied lock key did not open the store.
    #[error("lock key mismatch")]
    KeyMismatch,

    /// A row targeted by the operation does not exist.
    #[error("no such row: {0}")]
    NoSuchRow(String),

    /// A row targeted by an insert already exists.
    #[error("row already exists: {0}")]
    RowExists(String),

    /// Sealing or opening the lock canary failed.
    #[error("seal failure: {0}")]
    Seal(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for SecretsError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotInitialised | StoreError::Locked => {
                SecretsError::DaemonLocked(err.to_string())
            },
            StoreError::KeyMismatch => {
                SecretsError::DaemonLocked("the given lock code was incorrect".into())
            },
            StoreError::RowExists(name) => SecretsError::CollectionAlreadyExists(name.clone()),
            StoreError::NoSuchRow(_) | StoreError::Seal(_) => {
                SecretsError::Unknown(err.to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use secrets_core::ErrorCode;

    use super::*;

    #[test]
    fn test_locked_maps_to_daemon_locked() {
        let err: SecretsError = StoreError::Locked.into();
        assert_eq!(err.code(), ErrorCode::DaemonLocked);

        let err: SecretsError = StoreError::NotInitialised.into();
        assert_eq!(err.code(), ErrorCode::DaemonLocked);

        let err: SecretsError = StoreError::KeyMismatch.into();
        assert_eq!(err.code(), ErrorCode::DaemonLocked);
    }

    #[test]
    fn test_row_exists_maps_to_already_exists() {
        let err: SecretsError = StoreError::RowExists("notes".into()).into();
        assert_eq!(err.code(), ErrorCode::CollectionAlreadyExists);
    }

    #[test]
    fn test_seal_maps_to_unknown() {
        let err: SecretsError = StoreError::Seal("bad canary".into()).into();
        assert_eq!(err.code(), ErrorCode::Unknown);
    }
}
