// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broker configuration.

use secrets_core::{Result, SecretsError};

/// Autotest mode environment variable. When set, the default authentication
/// plugin name gets a `.test` suffix so test doubles are selected.
pub const ENV_AUTOTEST_MODE: &str = "SECRETS_BROKER_AUTOTEST_MODE";
/// Default authentication plugin name environment variable.
pub const ENV_DEFAULT_AUTH_PLUGIN: &str = "SECRETS_BROKER_DEFAULT_AUTH_PLUGIN";

/// The system default authentication plugin.
pub const DEFAULT_AUTHENTICATION_PLUGIN: &str = "secrets.plugin.authentication.system";

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Whether the daemon runs against test plugins.
    pub autotest_mode: bool,
    /// Authentication plugin used when a request does not name one.
    pub default_authentication_plugin: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            autotest_mode: false,
            default_authentication_plugin: DEFAULT_AUTHENTICATION_PLUGIN.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Build a configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(autotest) = parse_bool(ENV_AUTOTEST_MODE)? {
            config.autotest_mode = autotest;
        }
        if let Ok(name) = std::env::var(ENV_DEFAULT_AUTH_PLUGIN) {
            config.default_authentication_plugin = name;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_autotest_mode(mut self, autotest: bool) -> Self {
        self.autotest_mode = autotest;
        self
    }

    #[must_use]
    pub fn with_default_authentication_plugin(mut self, name: impl Into<String>) -> Self {
        self.default_authentication_plugin = name.into();
        self
    }

    /// The default authentication plugin name, adjusted for autotest mode.
    pub fn effective_default_authentication_plugin(&self) -> String {
        if self.autotest_mode {
            format!("{}.test", self.default_authentication_plugin)
        } else {
            self.default_authentication_plugin.clone()
        }
    }
}

fn parse_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Err(_) => Ok(None),
        Ok(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(SecretsError::Failed(format!(
                "invalid {key}: expected boolean (true/false/1/0/yes/no/on/off)"
            ))),
        },
    }
}
