// SPDX-License-Identifier: MIT OR Apache-2.0
//! The plugin registry: name → capability maps, immutable after startup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::traits::{
    AuthenticationPlugin, EncryptedStoragePlugin, EncryptionPlugin, StoragePlugin,
};

/// Name and version of an installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
}

/// Installed plugins grouped by capability.
pub struct PluginRegistry {
    storage: HashMap<String, Arc<dyn StoragePlugin>>,
    encryption: HashMap<String, Arc<dyn EncryptionPlugin>>,
    encrypted_storage: HashMap<String, Arc<dyn EncryptedStoragePlugin>>,
    authentication: HashMap<String, Arc<dyn AuthenticationPlugin>>,
    /// Encrypted-storage plugins that additionally expose crypto key storage.
    crypto_storage: HashSet<String>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    pub fn storage(&self, name: &str) -> Option<Arc<dyn StoragePlugin>> {
        self.storage.get(name).cloned()
    }

    pub fn encryption(&self, name: &str) -> Option<Arc<dyn EncryptionPlugin>> {
        self.encryption.get(name).cloned()
    }

    pub fn encrypted_storage(&self, name: &str) -> Option<Arc<dyn EncryptedStoragePlugin>> {
        self.encrypted_storage.get(name).cloned()
    }

    pub fn authentication(&self, name: &str) -> Option<Arc<dyn AuthenticationPlugin>> {
        self.authentication.get(name).cloned()
    }

    pub fn has_storage(&self, name: &str) -> bool {
        self.storage.contains_key(name)
    }

    pub fn has_encryption(&self, name: &str) -> bool {
        self.encryption.contains_key(name)
    }

    pub fn has_encrypted_storage(&self, name: &str) -> bool {
        self.encrypted_storage.contains_key(name)
    }

    pub fn has_authentication(&self, name: &str) -> bool {
        self.authentication.contains_key(name)
    }

    pub fn is_crypto_storage(&self, name: &str) -> bool {
        self.crypto_storage.contains(name)
    }

    pub fn all_storage(&self) -> Vec<Arc<dyn StoragePlugin>> {
        self.storage.values().cloned().collect()
    }

    pub fn all_encryption(&self) -> Vec<Arc<dyn EncryptionPlugin>> {
        self.encryption.values().cloned().collect()
    }

    pub fn all_encrypted_storage(&self) -> Vec<Arc<dyn EncryptedStoragePlugin>> {
        self.encrypted_storage.values().cloned().collect()
    }

    /// Installed plugin names and versions per capability, for
    /// `get_plugin_info`.
    pub fn plugin_info(&self) -> RegistryInfo {
        fn sorted(mut infos: Vec<PluginInfo>) -> Vec<PluginInfo> {
            infos.sort_by(|a, b| a.name.cmp(&b.name));
            infos
        }

        RegistryInfo {
            storage_plugins: sorted(
                self.storage
                    .values()
                    .map(|p| PluginInfo {
                        name: p.name().to_string(),
                        version: p.version().to_string(),
                    })
                    .collect(),
            ),
            encryption_plugins: sorted(
                self.encryption
                    .values()
                    .map(|p| PluginInfo {
                        name: p.name().to_string(),
                        version: p.version().to_string(),
                    })
                    .collect(),
            ),
            encrypted_storage_plugins: sorted(
                self.encrypted_storage
                    .values()
                    .map(|p| PluginInfo {
                        name: p.name().to_string(),
                        version: p.version().to_string(),
                    })
                    .collect(),
            ),
            authentication_plugins: sorted(
                self.authentication
                    .values()
                    .map(|p| PluginInfo {
                        name: p.name().to_string(),
                        version: p.version().to_string(),
                    })
                    .collect(),
            ),
        }
    }
}

/// `plugin_info()` result: one vector per capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    pub storage_plugins: Vec<PluginInfo>,
    pub encryption_plugins: Vec<PluginInfo>,
    pub encrypted_storage_plugins: Vec<PluginInfo>,
    pub authentication_plugins: Vec<PluginInfo>,
}

/// Builds an immutable [`PluginRegistry`].
#[derive(Default)]
pub struct PluginRegistryBuilder {
    storage: HashMap<String, Arc<dyn StoragePlugin>>,
    encryption: HashMap<String, Arc<dyn EncryptionPlugin>>,
    encrypted_storage: HashMap<String, Arc<dyn EncryptedStoragePlugin>>,
    authentication: HashMap<String, Arc<dyn AuthenticationPlugin>>,
    crypto_storage: HashSet<String>,
}

impl PluginRegistryBuilder {
    #[must_use]
    pub fn with_storage(mut self, plugin: Arc<dyn StoragePlugin>) -> Self {
        self.storage.insert(plugin.name().to_string(), plugin);
        self
    }

    #[must_use]
    pub fn with_encryption(mut self, plugin: Arc<dyn EncryptionPlugin>) -> Self {
        self.encryption.insert(plugin.name().to_string(), plugin);
        self
    }

    #[must_use]
    pub fn with_encrypted_storage(mut self, plugin: Arc<dyn EncryptedStoragePlugin>) -> Self {
        self.encrypted_storage.insert(plugin.name().to_string(), plugin);
        self
    }

    /// Register an encrypted-storage plugin that also offers crypto key
    /// storage to the crypto sibling.
    #[must_use]
    pub fn with_crypto_storage(mut self, plugin: Arc<dyn EncryptedStoragePlugin>) -> Self {
        self.crypto_storage.insert(plugin.name().to_string());
        self.encrypted_storage.insert(plugin.name().to_string(), plugin);
        self
    }

    #[must_use]
    pub fn with_authentication(mut self, plugin: Arc<dyn AuthenticationPlugin>) -> Self {
        self.authentication.insert(plugin.name().to_string(), plugin);
        self
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            storage: self.storage,
            encryption: self.encryption,
            encrypted_storage: self.encrypted_storage,
            authentication: self.authentication,
            crypto_storage: self.crypto_storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{
        HkdfAesEncryptionPlugin, MemoryEncryptedStoragePlugin, MemoryStoragePlugin,
        TestAuthenticationPlugin,
    };

    fn build_registry() -> PluginRegistry {
        PluginRegistry::builder()
            .with_storage(Arc::new(MemoryStoragePlugin::new("store")))
            .with_encryption(Arc::new(HkdfAesEncryptionPlugin::new("enc")))
            .with_crypto_storage(Arc::new(MemoryEncryptedStoragePlugin::new("encstore")))
            .with_authentication(Arc::new(TestAuthenticationPlugin::new("auth")))
            .build()
    }

    #[test]
    fn test_lookup_by_capability() {
        let registry = build_registry();
        assert!(registry.has_storage("store"));
        assert!(registry.has_encryption("enc"));
        assert!(registry.has_encrypted_storage("encstore"));
        assert!(registry.has_authentication("auth"));

        assert!(!registry.has_storage("encstore"));
        assert!(!registry.has_encrypted_storage("store"));
        assert!(registry.encryption("missing").is_none());
    }

    #[test]
    fn test_crypto_storage_flag() {
        let registry = build_registry();
        assert!(registry.is_crypto_storage("encstore"));
        assert!(!registry.is_crypto_storage("store"));
    }

    #[test]
    fn test_plugin_info_lists_all_capabilities() {
        let info = build_registry().plugin_info();
        assert_eq!(info.storage_plugins.len(), 1);
        assert_eq!(info.storage_plugins[0].name, "store");
        assert_eq!(info.encryption_plugins[0].name, "enc");
        assert_eq!(info.encrypted_storage_plugins[0].name, "encstore");
        assert_eq!(info.authentication_plugins[0].name, "auth");
    }
}
