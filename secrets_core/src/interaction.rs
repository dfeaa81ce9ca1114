// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parameters describing a prompt shown by an authentication plugin.

use serde::{Deserialize, Serialize};

/// The operation a prompt is being shown for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionOperation {
    CreateCollection,
    StoreSecret,
    ReadSecret,
    UnlockCollection,
    DeleteSecret,
    RequestUserData,
    UnlockDatabase,
    UnlockPlugin,
    ModifyLockDatabase,
    ModifyLockPlugin,
}

/// The kind of input the prompt collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputType {
    #[default]
    AlphaNumeric,
    Confirmation,
}

/// How entered input is echoed back to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EchoMode {
    Normal,
    #[default]
    PasswordEchoOnEdit,
    NoEcho,
}

/// Describes a prompt the authentication plugin must show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionParameters {
    /// The application id the prompt is shown on behalf of.
    pub application_id: String,
    /// The collection the prompt concerns, if any.
    pub collection_name: String,
    /// The secret the prompt concerns, if any.
    pub secret_name: String,
    pub operation: InteractionOperation,
    pub input_type: InputType,
    pub echo_mode: EchoMode,
    pub prompt_text: String,
    /// Override of the authentication plugin to use; empty selects the default.
    pub authentication_plugin_name: String,
    /// Address of an in-process interaction service, for application-hosted
    /// prompts. Handed to the plugin untouched.
    pub interaction_service_address: String,
}

impl InteractionParameters {
    pub fn new(operation: InteractionOperation) -> Self {
        Self {
            application_id: String::new(),
            collection_name: String::new(),
            secret_name: String::new(),
            operation,
            input_type: InputType::default(),
            echo_mode: EchoMode::default(),
            prompt_text: String::new(),
            authentication_plugin_name: String::new(),
            interaction_service_address: String::new(),
        }
    }

    #[must_use]
    pub fn with_application_id(mut self, id: impl Into<String>) -> Self {
        self.application_id = id.into();
        self
    }

    #[must_use]
    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    #[must_use]
    pub fn with_secret_name(mut self, name: impl Into<String>) -> Self {
        self.secret_name = name.into();
        self
    }

    #[must_use]
    pub fn with_prompt_text(mut self, text: impl Into<String>) -> Self {
        self.prompt_text = text.into();
        self
    }

    #[must_use]
    pub fn with_authentication_plugin(mut self, name: impl Into<String>) -> Self {
        self.authentication_plugin_name = name.into();
        self
    }

    #[must_use]
    pub fn with_input_type(mut self, input_type: InputType) -> Self {
        self.input_type = input_type;
        self
    }
}
