// SPDX-License-Identifier: MIT OR Apache-2.0
//! Synchronous informational operations.

use secrets_core::Result;
use secret_plugins::RegistryInfo;

use super::RequestProcessor;

impl RequestProcessor {
    /// List installed plugins by capability.
    pub fn get_plugin_info(&self, _caller_pid: u32, _request_id: u64) -> Result<RegistryInfo> {
        Ok(self.registry.plugin_info())
    }

    /// List the collection names recorded in the bookkeeping store.
    pub fn collection_names(&self, _caller_pid: u32, _request_id: u64) -> Result<Vec<String>> {
        Ok(self.store.collection_names()?)
    }
}
