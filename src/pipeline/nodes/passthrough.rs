//! PassThrough: forwards every message untouched.
//!
//! Useful as a placeholder stage and as the generic forwarding stage of an
//! untyped chain: messages are never unpacked, so any payload passes.

use crate::config::Properties;
use crate::pipeline::channel::{GenericInputChannel, OutputChannel};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::node::Processable;

/// Forwards messages in order, optionally logging progress.
pub struct PassThrough {
    name: String,
    /// Log a progress line every `log_every` messages. 0 disables.
    log_every: u64,
}

impl PassThrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_every: 0,
        }
    }

    /// Reads `log_every` (default 0).
    pub fn from_properties(name: impl Into<String>, props: &Properties) -> PipelineResult<Self> {
        Ok(Self {
            name: name.into(),
            log_every: props.get_or("log_every", 0u64)?,
        })
    }

    pub fn log_every(&self) -> u64 {
        self.log_every
    }
}

impl Processable for PassThrough {
    fn process(&self, input: GenericInputChannel, output: OutputChannel) -> anyhow::Result<()> {
        let mut forwarded = 0u64;
        for message in input {
            output.push_message(message)?;
            forwarded += 1;
            if self.log_every > 0 && forwarded % self.log_every == 0 {
                tracing::info!(node = %self.name, forwarded, "Forwarding");
            }
        }
        tracing::debug!(node = %self.name, forwarded, "Input exhausted");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
