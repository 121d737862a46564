//! Broadcast: fan-out branch that copies every message to each output.

use crate::pipeline::channel::{GenericInputChannel, OutputChannel};
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::Branch;
use std::collections::BTreeMap;

/// Sends a deep copy of each input message to every output.
///
/// An output whose consumer has gone away is dropped with a warning; the
/// remaining outputs keep receiving. Once no output is left the branch faults.
pub struct Broadcast {
    name: String,
}

impl Broadcast {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Branch for Broadcast {
    fn process(
        &self,
        input: GenericInputChannel,
        mut outputs: BTreeMap<String, OutputChannel>,
    ) -> anyhow::Result<()> {
        for message in input {
            let mut closed = Vec::new();
            let last = outputs.len().saturating_sub(1);
            let mut original = Some(message);

            for (i, (port, output)) in outputs.iter().enumerate() {
                // The last output gets the original, the others a clone.
                let copy = if i == last {
                    original.take()
                } else {
                    original.as_ref().cloned()
                };
                let Some(copy) = copy else { break };

                if let Err(PipelineError::ChannelClosed) = output.push_message(copy) {
                    tracing::warn!(node = %self.name, port = %port, "Output closed, dropping branch");
                    closed.push(port.clone());
                }
            }

            for port in closed {
                outputs.remove(&port);
            }
            if outputs.is_empty() {
                return Err(PipelineError::ChannelClosed.into());
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
