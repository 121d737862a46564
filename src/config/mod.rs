//! Configuration module for flowline
//!
//! A pipeline is described by a TOML or JSON file:
//!
//! ```toml
//! [channel]
//! capacity = 64          # omit for unbounded channels
//!
//! [context.parameters]
//! site = "lab-2"
//!
//! [[nodes]]
//! name = "fan"
//! type = "broadcast"
//! outputs = ["left", "right"]
//!
//! [[nodes]]
//! name = "left"
//! type = "passthrough"
//! properties = { log_every = 1000 }
//!
//! [[edges]]
//! from = "fan"
//! from_port = "left"
//! to = "left"
//! ```
//!
//! When no `[[edges]]` are given the nodes are chained in the order listed.

pub mod properties;

pub use properties::{Context, Properties};

use crate::error::{FlowError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Channel settings shared by every edge of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size per channel. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

/// One node of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,

    /// Registered node type, e.g. `passthrough`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub properties: Properties,

    /// Input port names, for merge nodes.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Output port names, for branch nodes.
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// One edge of the graph. Omitted ports resolve to the first free one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub from: String,
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<String>,
}

/// Full description of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub channel: ChannelConfig,
    pub context: Context,
    pub nodes: Vec<NodeConfig>,
    pub edges: Vec<EdgeConfig>,
}

impl PipelineConfig {
    /// Load a pipeline description; `.json` files are read as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(FlowError::from)
            .with_context(|| format!("Failed to read pipeline config {:?}", path))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        config.with_context(|| format!("Loading {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FlowError::Config(format!("Failed to parse TOML: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| FlowError::Config(format!("Failed to parse JSON: {}", e)))
    }

    /// Save as TOML or JSON, chosen by extension like [`PipelineConfig::load`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let content = if is_json {
            serde_json::to_string_pretty(self)
                .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(FlowError::from)
            .with_context(|| format!("Failed to write pipeline config {:?}", path))
    }
}
