use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::key::{CategoryId, TypeKey};

/// A job prototype: registry key plus the template state copied into every
/// dispensed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub type_identity: TypeKey,
    pub category_id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl Job {
    pub fn new(type_identity: TypeKey, category_id: CategoryId) -> Self {
        Self {
            type_identity,
            category_id,
            display_name: None,
            state: Map::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn get_state<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Display name if set, otherwise the type identity.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.type_identity.as_str())
    }
}
