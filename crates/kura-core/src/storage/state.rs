use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::error::StorageSystemError;

/// Supported state document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-state" feature
    #[cfg(feature = "yaml-state")]
    Yaml,
    /// TOML format (.toml) - requires "toml-state" feature
    #[cfg(feature = "toml-state")]
    Toml,
}

impl StateFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            StateFormat::Json => "json",
            #[cfg(feature = "yaml-state")]
            StateFormat::Yaml => "yaml",
            #[cfg(feature = "toml-state")]
            StateFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(StateFormat::Json),
                #[cfg(feature = "yaml-state")]
                "yaml" | "yml" => Some(StateFormat::Yaml),
                #[cfg(feature = "toml-state")]
                "toml" => Some(StateFormat::Toml),
                _ => None,
            })
    }

    /// Leading document-start marker, where the format defines one.
    pub(crate) fn prolog(&self) -> Option<&'static str> {
        #[cfg(feature = "yaml-state")]
        if matches!(self, StateFormat::Yaml) {
            return Some("---\n");
        }
        None
    }
}

/// One component's serialized state: an opaque bag of values.
///
/// The engine never inspects the shape of what components store here. An
/// empty `StateData` doubles as the cleared-state marker: writing it
/// through an externalization session removes the component's entry from
/// the backing document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    /// Raw state values
    #[serde(flatten)]
    values: IndexMap<String, serde_json::Value>,
}

impl StateData {
    /// Create a new empty state. Also serves as the cleared-state marker.
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
        }
    }

    /// Get a state value
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a state value with default
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Set a state value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        match serde_json::to_value(value) {
            Ok(json_value) => {
                self.values.insert(key.to_string(), json_value);
                Ok(())
            }
            Err(e) => Err(Error::StorageSystem(StorageSystemError::SerializationError {
                format: "json".to_string(),
                source: Box::new(e),
            })),
        }
    }

    /// Remove a state value
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.shift_remove(key)
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get all keys
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Whether this state carries no values (the cleared marker)
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge with another state, overriding existing values
    pub fn merge(&mut self, other: &StateData) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: StateFormat) -> Result<String> {
        serialize_value(self, format)
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: StateFormat) -> Result<Self> {
        deserialize_value(data, format)
    }
}

/// The persisted tree held by a file- or directory-based backend: one
/// [`StateData`] per component name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(flatten)]
    components: IndexMap<String, StateData>,
}

impl StateDocument {
    /// Create a new empty document
    pub fn new() -> Self {
        Self {
            components: IndexMap::new(),
        }
    }

    /// State of one component, if present
    pub fn get(&self, component_name: &str) -> Option<&StateData> {
        self.components.get(component_name)
    }

    /// Replace one component's state
    pub fn set(&mut self, component_name: impl Into<String>, state: StateData) {
        self.components.insert(component_name.into(), state);
    }

    /// Drop one component's state
    pub fn remove(&mut self, component_name: &str) -> Option<StateData> {
        self.components.shift_remove(component_name)
    }

    /// Component names present in the document
    pub fn component_names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    /// Iterate over (component name, state) pairs
    pub fn components(&self) -> impl Iterator<Item = (&String, &StateData)> {
        self.components.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Serialize for `format`, prefixing the document-start marker when
    /// `uses_prolog` is set and the format defines one.
    pub fn serialize(&self, format: StateFormat, uses_prolog: bool) -> Result<String> {
        let body = serialize_value(self, format)?;
        match format.prolog() {
            Some(prolog) if uses_prolog && !body.starts_with(prolog) => {
                Ok(format!("{}{}", prolog, body))
            }
            _ => Ok(body),
        }
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: StateFormat) -> Result<Self> {
        deserialize_value(data, format)
    }
}

fn serialize_value<T: Serialize>(value: &T, format: StateFormat) -> Result<String> {
    match format {
        StateFormat::Json => serde_json::to_string_pretty(value).map_err(|e| {
            Error::StorageSystem(StorageSystemError::SerializationError {
                format: "json".to_string(),
                source: Box::new(e),
            })
        }),
        #[cfg(feature = "yaml-state")]
        StateFormat::Yaml => serde_yaml::to_string(value).map_err(|e| {
            Error::StorageSystem(StorageSystemError::SerializationError {
                format: "yaml".to_string(),
                source: Box::new(e),
            })
        }),
        #[cfg(feature = "toml-state")]
        StateFormat::Toml => toml::to_string_pretty(value).map_err(|e| {
            Error::StorageSystem(StorageSystemError::SerializationError {
                format: "toml".to_string(),
                source: Box::new(e),
            })
        }),
    }
}

fn deserialize_value<T: for<'de> Deserialize<'de>>(data: &str, format: StateFormat) -> Result<T> {
    match format {
        StateFormat::Json => serde_json::from_str(data).map_err(|e| {
            Error::StorageSystem(StorageSystemError::DeserializationError {
                format: "json".to_string(),
                source: Box::new(e),
            })
        }),
        #[cfg(feature = "yaml-state")]
        StateFormat::Yaml => serde_yaml::from_str(data).map_err(|e| {
            Error::StorageSystem(StorageSystemError::DeserializationError {
                format: "yaml".to_string(),
                source: Box::new(e),
            })
        }),
        #[cfg(feature = "toml-state")]
        StateFormat::Toml => toml::from_str(data).map_err(|e| {
            Error::StorageSystem(StorageSystemError::DeserializationError {
                format: "toml".to_string(),
                source: Box::new(e),
            })
        }),
    }
}
