// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lock policy, access control and interaction-mode enums.

use serde::{Deserialize, Serialize};

/// How a collection (or standalone secret) is keyed and when it relocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockSemantic {
    /// Keyed by the device lock; stays unlocked while the daemon runs.
    DeviceLockKeepUnlocked,
    /// Keyed by the device lock; relocks when the device relocks.
    DeviceLockRelock,
    /// Keyed by a passphrase-derived key; stays unlocked once provided.
    CustomLockKeepUnlocked,
    /// Keyed by a passphrase-derived key; relocks after a timeout.
    CustomLockTimeoutRelock,
}

impl UnlockSemantic {
    /// Whether this semantic is keyed by the device lock key.
    pub fn uses_device_lock(self) -> bool {
        matches!(self, Self::DeviceLockKeepUnlocked | Self::DeviceLockRelock)
    }

    /// Whether a cached unlock key must be evicted on a timer.
    pub fn relocks_on_timeout(self) -> bool {
        matches!(self, Self::CustomLockTimeoutRelock)
    }
}

/// Who may operate on a collection or secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessControlMode {
    /// Only the owning application id may operate.
    #[default]
    OwnerOnly,
    /// Deferred to an external access-control authority.
    System,
    /// No per-application checks.
    NoAccessControl,
}

/// Whether the broker may drive user interaction for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserInteractionMode {
    /// Fail rather than prompt.
    Prevent,
    /// The system interaction service may prompt.
    System,
    /// The calling application hosts the prompt in-process.
    Application,
}

/// Target of a lock-code operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockCodeTarget {
    /// The master bookkeeping database.
    BookkeepingDatabase,
    /// A named storage / encryption / encrypted-storage / authentication plugin.
    ExtensionPlugin(String),
    /// A named collection (reserved for future flows).
    Collection(String),
    /// A named standalone secret (reserved for future flows).
    StandaloneSecret(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lock_semantics() {
        assert!(UnlockSemantic::DeviceLockKeepUnlocked.uses_device_lock());
        assert!(UnlockSemantic::DeviceLockRelock.uses_device_lock());
        assert!(!UnlockSemantic::CustomLockKeepUnlocked.uses_device_lock());
        assert!(!UnlockSemantic::CustomLockTimeoutRelock.uses_device_lock());
    }

    #[test]
    fn test_timeout_relock() {
        assert!(UnlockSemantic::CustomLockTimeoutRelock.relocks_on_timeout());
        assert!(!UnlockSemantic::CustomLockKeepUnlocked.relocks_on_timeout());
        assert!(!UnlockSemantic::DeviceLockRelock.relocks_on_timeout());
    }
}
