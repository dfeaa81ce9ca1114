// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plugin capability surface for the secrets broker.
//!
//! Plugins vary along three orthogonal axes: storage, encryption and
//! authentication, with a fused encrypted-storage variant that holds its own
//! lock state. Each capability is a narrow object-safe trait; the registry
//! composes plugins from capability objects and is immutable after startup.
//!
//! Every trait method is blocking by design. The request processor never
//! calls a plugin on its dispatch task; all plugin I/O is submitted to the
//! worker pool.

mod memory;
mod registry;
mod traits;
pub mod wrappers;

pub use memory::{
    HkdfAesEncryptionPlugin, MemoryEncryptedStoragePlugin, MemoryStoragePlugin,
    TestAuthenticationPlugin,
};
pub use registry::{PluginInfo, PluginRegistry, PluginRegistryBuilder, RegistryInfo};
pub use traits::{
    AuthenticationPlugin, AuthenticationTypes, EncryptedRecord, EncryptedStoragePlugin,
    EncryptionPlugin, InteractionEvent, InteractionRelay, StoragePlugin,
};
