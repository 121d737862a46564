//! Test data builders for creating test pipelines and configs

use flowline::config::{EdgeConfig, NodeConfig, PipelineConfig, Properties};
use flowline::pipeline::{GenericInputChannel, OutputChannel, Processable};

/// Builder for creating test pipeline configs
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.channel.capacity = Some(capacity);
        self
    }

    pub fn node(mut self, name: &str, kind: &str) -> Self {
        self.config.nodes.push(NodeConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            properties: Properties::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self
    }

    pub fn branch(mut self, name: &str, kind: &str, outputs: &[&str]) -> Self {
        self = self.node(name, kind);
        if let Some(node) = self.config.nodes.last_mut() {
            node.outputs = outputs.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn merge(mut self, name: &str, kind: &str, inputs: &[&str]) -> Self {
        self = self.node(name, kind);
        if let Some(node) = self.config.nodes.last_mut() {
            node.inputs = inputs.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn edge(mut self, from: &str, from_port: Option<&str>, to: &str, to_port: Option<&str>) -> Self {
        self.config.edges.push(EdgeConfig {
            from: from.to_string(),
            to: to.to_string(),
            from_port: from_port.map(str::to_string),
            to_port: to_port.map(str::to_string),
        });
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

/// Stage that forwards messages until the `fail_at`-th (0-based), then faults.
pub struct FailingStage {
    name: String,
    fail_at: usize,
}

impl FailingStage {
    pub fn new(name: &str, fail_at: usize) -> Self {
        Self {
            name: name.to_string(),
            fail_at,
        }
    }
}

impl Processable for FailingStage {
    fn process(&self, input: GenericInputChannel, output: OutputChannel) -> anyhow::Result<()> {
        for (i, message) in input.enumerate() {
            anyhow::ensure!(i != self.fail_at, "{} failed on message {}", self.name, i);
            output.push_message(message)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .capacity(4)
            .branch("fan", "broadcast", &["a", "b"])
            .node("sink", "passthrough")
            .edge("fan", Some("b"), "sink", None)
            .build();

        assert_eq!(config.channel.capacity, Some(4));
        assert_eq!(config.nodes[0].outputs, vec!["a", "b"]);
        assert_eq!(config.edges.len(), 1);
    }
}
