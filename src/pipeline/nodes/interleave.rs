//! Interleave: fan-in merge forwarding from whichever input is ready.
//!
//! Waits on all open inputs at once, so a silent branch never holds back a busy
//! one. Per-input order is preserved; the relative order between inputs is
//! whatever order messages become ready in. A closed and drained input is
//! dropped from the wait set, and the output closes once every input has.

use crate::pipeline::channel::{GenericInputChannel, OutputChannel};
use crate::pipeline::node::Merge;
use crossbeam_channel::Select;
use std::collections::BTreeMap;

pub struct Interleave {
    name: String,
}

impl Interleave {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Merge for Interleave {
    fn process(
        &self,
        inputs: BTreeMap<String, GenericInputChannel>,
        output: OutputChannel,
    ) -> anyhow::Result<()> {
        let mut open: Vec<(String, GenericInputChannel)> = inputs.into_iter().collect();
        let mut forwarded = 0u64;

        while !open.is_empty() {
            let (index, received) = {
                let mut select = Select::new();
                for (_, input) in &open {
                    select.recv(input.receiver());
                }
                let oper = select.select();
                let index = oper.index();
                (index, oper.recv(open[index].1.receiver()))
            };

            match received {
                Ok(message) => {
                    output.push_message(message)?;
                    forwarded += 1;
                }
                Err(_) => {
                    let (port, _) = open.remove(index);
                    tracing::debug!(node = %self.name, port = %port, "Merge input closed");
                }
            }
        }

        tracing::debug!(node = %self.name, forwarded, "All merge inputs closed");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
