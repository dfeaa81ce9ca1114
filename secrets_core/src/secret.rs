// SPDX-License-Identifier: MIT OR Apache-2.0
//! Secret payloads, identifiers and filter data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Tag metadata attached to a secret for filter-based discovery.
pub type FilterData = HashMap<String, String>;

/// How multiple filter key=value pairs combine during a find operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Every pair must match.
    #[default]
    And,
    /// At least one pair must match.
    Or,
}

impl FilterOperator {
    /// Evaluate this operator over a secret's filter map.
    pub fn matches(self, filter: &FilterData, candidate: &FilterData) -> bool {
        let mut pairs = filter.iter();
        match self {
            Self::And => pairs.all(|(k, v)| candidate.get(k) == Some(v)),
            Self::Or => pairs.any(|(k, v)| candidate.get(k) == Some(v)),
        }
    }
}

/// Identifies a secret, either inside a collection or standalone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SecretIdentifier {
    /// The secret's name within its collection.
    pub name: String,
    /// The owning collection name; empty for standalone secrets.
    pub collection_name: String,
}

impl SecretIdentifier {
    pub fn new(name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_name: collection_name.into(),
        }
    }

    /// Identifier for a standalone secret (no collection).
    pub fn standalone(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_name: String::new(),
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.collection_name.is_empty()
    }
}

/// A secret payload: opaque bytes plus tag metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Secret {
    pub identifier: SecretIdentifier,
    pub data: Vec<u8>,
    pub filter_data: FilterData,
}

impl Secret {
    pub fn new(identifier: SecretIdentifier, data: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier,
            data: data.into(),
            filter_data: FilterData::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_data.insert(key.into(), value.into());
        self
    }
}
