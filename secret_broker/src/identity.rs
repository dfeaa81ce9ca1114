// SPDX-License-Identifier: MIT OR Apache-2.0
//! Caller identity resolution.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

/// Well-known application id used for all platform callers.
pub const PLATFORM_APPLICATION_ID: &str = "platform";

/// Resolves a caller pid to an application identity.
pub trait ApplicationIdentity: Send + Sync {
    /// Whether the caller is a privileged platform application
    /// (e.g. system settings), which bypasses per-application ownership.
    fn is_platform_application(&self, pid: u32) -> bool;

    /// The application id for an unprivileged caller.
    fn application_id(&self, pid: u32) -> String;

    /// The well-known id used for all platform callers.
    fn platform_application_id(&self) -> String {
        PLATFORM_APPLICATION_ID.to_string()
    }
}

/// Map-backed identity resolver used by the daemon wiring and tests.
/// Unregistered pids get a stable pid-derived id.
#[derive(Default)]
pub struct MappedIdentity {
    applications: RwLock<HashMap<u32, String>>,
    platform: RwLock<HashSet<u32>>,
}

impl MappedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_application(&self, pid: u32, application_id: impl Into<String>) {
        self.applications.write().insert(pid, application_id.into());
    }

    pub fn register_platform_application(&self, pid: u32) {
        self.platform.write().insert(pid);
    }
}

impl ApplicationIdentity for MappedIdentity {
    fn is_platform_application(&self, pid: u32) -> bool {
        self.platform.read().contains(&pid)
    }

    fn application_id(&self, pid: u32) -> String {
        self.applications
            .read()
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| format!("pid:{pid}"))
    }
}
