//! Registry of node factories, keyed by the type name used in configuration.

use crate::config::{Context, Properties};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::AnyNode;
use crate::pipeline::nodes::{Broadcast, Interleave, PassThrough};
use std::collections::HashMap;

/// Everything a factory gets to build one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec<'a> {
    pub name: &'a str,
    pub context: &'a Context,
    pub properties: &'a Properties,
    /// Declared input ports (merge nodes).
    pub inputs: &'a [String],
    /// Declared output ports (branch nodes).
    pub outputs: &'a [String],
}

/// Builds a node from its spec.
pub type NodeFactory = Box<dyn Fn(&NodeSpec<'_>) -> PipelineResult<AnyNode> + Send + Sync>;

/// Maps node type names to factories.
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in node types: `passthrough`, `broadcast`
    /// and `interleave`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register("passthrough", |spec| {
            PassThrough::from_properties(spec.name, spec.properties).map(AnyNode::stage)
        });

        registry.register("broadcast", |spec| {
            if spec.outputs.is_empty() {
                return Err(PipelineError::Property {
                    key: "outputs".to_string(),
                    message: format!("broadcast node '{}' needs at least one output", spec.name),
                });
            }
            Ok(AnyNode::branch(
                Broadcast::new(spec.name),
                spec.outputs.iter().cloned(),
            ))
        });

        registry.register("interleave", |spec| {
            if spec.inputs.is_empty() {
                return Err(PipelineError::Property {
                    key: "inputs".to_string(),
                    message: format!("interleave node '{}' needs at least one input", spec.name),
                });
            }
            Ok(AnyNode::merge(
                Interleave::new(spec.name),
                spec.inputs.iter().cloned(),
            ))
        });

        registry
    }

    /// Register a factory, replacing any previous one for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&NodeSpec<'_>) -> PipelineResult<AnyNode> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self
            .factories
            .insert(type_name.clone(), Box::new(factory))
            .is_some()
        {
            tracing::debug!("Replaced node factory '{}'", type_name);
        }
    }

    /// Build a node of type `type_name`.
    pub fn create(&self, type_name: &str, spec: &NodeSpec<'_>) -> PipelineResult<AnyNode> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| PipelineError::UnknownNodeType(type_name.to_string()))?;
        factory(spec)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
