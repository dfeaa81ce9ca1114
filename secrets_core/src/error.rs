// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error kinds surfaced to broker clients.

use serde::{Deserialize, Serialize};

/// Stable error codes, suitable for mapping onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Failed,
    InvalidCollection,
    CollectionAlreadyExists,
    InvalidSecret,
    SecretAlreadyExists,
    InvalidFilter,
    InvalidExtensionPlugin,
    CollectionLocked,
    IncorrectAuthenticationCode,
    DaemonLocked,
    InteractionRequired,
    ApplicationInteractionRequired,
    InteractionCanceled,
    PermissionDenied,
    NotSupported,
    InterleavedRequest,
    Unknown,
}

/// Error type for broker operations, carried as a code plus a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretsError {
    /// Generic failure reported by a plugin or collaborator.
    Failed(String),
    /// Empty, reserved or nonexistent collection name.
    InvalidCollection(String),
    /// A collection with the given name already exists.
    CollectionAlreadyExists(String),
    /// Empty or nonexistent secret name.
    InvalidSecret(String),
    /// A secret with the given name already exists.
    SecretAlreadyExists(String),
    /// Empty or malformed filter data.
    InvalidFilter(String),
    /// The named plugin does not exist or has the wrong capability.
    InvalidExtensionPlugin(String),
    /// The collection is locked and cannot be unlocked without the device lock.
    CollectionLocked(String),
    /// The supplied authentication code or key did not match.
    IncorrectAuthenticationCode(String),
    /// The bookkeeping database is locked.
    DaemonLocked(String),
    /// The operation needs user interaction but the caller prevented it.
    InteractionRequired(String),
    /// The operation needs in-process (application) user interaction.
    ApplicationInteractionRequired(String),
    /// The user canceled the interaction view.
    InteractionCanceled(String),
    /// The caller does not own the target row.
    PermissionDenied(String),
    /// The operation is not supported (or not yet implemented).
    NotSupported(String),
    /// Another mutating request is in flight for the same collection.
    /// Retryable by the client.
    InterleavedRequest(String),
    /// Internal error.
    Unknown(String),
}

impl SecretsError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Failed(_) => ErrorCode::Failed,
            Self::InvalidCollection(_) => ErrorCode::InvalidCollection,
            Self::CollectionAlreadyExists(_) => ErrorCode::CollectionAlreadyExists,
            Self::InvalidSecret(_) => ErrorCode::InvalidSecret,
            Self::SecretAlreadyExists(_) => ErrorCode::SecretAlreadyExists,
            Self::InvalidFilter(_) => ErrorCode::InvalidFilter,
            Self::InvalidExtensionPlugin(_) => ErrorCode::InvalidExtensionPlugin,
            Self::CollectionLocked(_) => ErrorCode::CollectionLocked,
            Self::IncorrectAuthenticationCode(_) => ErrorCode::IncorrectAuthenticationCode,
            Self::DaemonLocked(_) => ErrorCode::DaemonLocked,
            Self::InteractionRequired(_) => ErrorCode::InteractionRequired,
            Self::ApplicationInteractionRequired(_) => ErrorCode::ApplicationInteractionRequired,
            Self::InteractionCanceled(_) => ErrorCode::InteractionCanceled,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::NotSupported(_) => ErrorCode::NotSupported,
            Self::InterleavedRequest(_) => ErrorCode::InterleavedRequest,
            Self::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// The human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(m)
            | Self::InvalidCollection(m)
            | Self::CollectionAlreadyExists(m)
            | Self::InvalidSecret(m)
            | Self::SecretAlreadyExists(m)
            | Self::InvalidFilter(m)
            | Self::InvalidExtensionPlugin(m)
            | Self::CollectionLocked(m)
            | Self::IncorrectAuthenticationCode(m)
            | Self::DaemonLocked(m)
            | Self::InteractionRequired(m)
            | Self::ApplicationInteractionRequired(m)
            | Self::InteractionCanceled(m)
            | Self::PermissionDenied(m)
            | Self::NotSupported(m)
            | Self::InterleavedRequest(m)
            | Self::Unknown(m) => m,
        }
    }

    /// Whether the client may retry the request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InterleavedRequest(_))
    }
}

impl std::fmt::Display for SecretsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(m) => write!(f, "operation failed: {m}"),
            Self::InvalidCollection(m) => write!(f, "invalid collection: {m}"),
            Self::CollectionAlreadyExists(m) => write!(f, "collection already exists: {m}"),
            Self::InvalidSecret(m) => write!(f, "invalid secret: {m}"),
            Self::SecretAlreadyExists(m) => write!(f, "secret already exists: {m}"),
            Self::InvalidFilter(m) => write!(f, "invalid filter: {m}"),
            Self::InvalidExtensionPlugin(m) => write!(f, "invalid extension plugin: {m}"),
            Self::CollectionLocked(m) => write!(f, "collection is locked: {m}"),
            Self::IncorrectAuthenticationCode(m) => {
                write!(f, "incorrect authentication code: {m}")
            },
            Self::DaemonLocked(m) => write!(f, "secrets daemon is locked: {m}"),
            Self::InteractionRequired(m) => write!(f, "operation requires user interaction: {m}"),
            Self::ApplicationInteractionRequired(m) => {
                write!(f, "operation requires application user interaction: {m}")
            },
            Self::InteractionCanceled(m) => write!(f, "interaction canceled by user: {m}"),
            Self::PermissionDenied(m) => write!(f, "permission denied: {m}"),
            Self::NotSupported(m) => write!(f, "operation not supported: {m}"),
            Self::InterleavedRequest(m) => write!(f, "interleaved request: {m}"),
            Self::Unknown(m) => write!(f, "unknown error: {m}"),
        }
    }
}

impl std::error::Error for SecretsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        let err = SecretsError::PermissionDenied("owned by another application".into());
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(err.message(), "owned by another application");
    }

    #[test]
    fn test_display_includes_message() {
        let err = SecretsError::CollectionLocked("wallet".into());
        assert_eq!(err.to_string(), "collection is locked: wallet");
    }

    #[test]
    fn test_only_interleaved_is_retryable() {
        assert!(SecretsError::InterleavedRequest("busy".into()).is_retryable());
        assert!(!SecretsError::Failed("nope".into()).is_retryable());
        assert!(!SecretsError::CollectionLocked("c".into()).is_retryable());
    }

    #[test]
    fn test_serde_round_trip() {
        let err = SecretsError::InvalidExtensionPlugin("no such plugin: store".into());
        let json = serde_json::to_string(&err).unwrap();
        let back: SecretsError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
