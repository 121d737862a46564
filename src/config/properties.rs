//! Node construction inputs: typed properties and read-only context.

use crate::pipeline::error::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named node properties as written in the pipeline configuration.
///
/// Values stay in their `toml::Value` form until a node asks for them with a
/// concrete type, so a typo'd type surfaces as a property error naming the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(toml::Table);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read `key` as `T`. `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> PipelineResult<Option<T>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value
                .clone()
                .try_into()
                .map(Some)
                .map_err(|e| PipelineError::Property {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Read `key` as `T`, falling back to `default` when absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> PipelineResult<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}

impl From<toml::Table> for Properties {
    fn from(table: toml::Table) -> Self {
        Self(table)
    }
}

/// Read-only metadata handed to every node factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Context {
    /// Free-form description of the stream being processed.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub header: serde_json::Value,
    pub parameters: BTreeMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: serde_json::Value) -> Self {
        self.header = header;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}
