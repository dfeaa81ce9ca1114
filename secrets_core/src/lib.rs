// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared types for the on-device secrets broker.
//!
//! This crate carries the API surface common to the bookkeeping store, the
//! extension plugins and the request processor: the error kinds returned to
//! clients, secret payload and identifier types, lock-policy enums,
//! user-interaction parameters, and the stable hashed-name derivation under
//! which secret rows are indexed.

mod error;
mod interaction;
mod names;
mod policy;
mod secret;

pub use error::{ErrorCode, SecretsError};
pub use interaction::{EchoMode, InputType, InteractionOperation, InteractionParameters};
pub use names::{hashed_secret_name, is_reserved_collection_name, STANDALONE_COLLECTION};
pub use policy::{AccessControlMode, LockCodeTarget, UnlockSemantic, UserInteractionMode};
pub use secret::{FilterData, FilterOperator, Secret, SecretIdentifier};

/// Result alias used across the broker crates.
pub type Result<T> = std::result::Result<T, SecretsError>;
