//! Node abstraction for the pipeline.
//!
//! Three node shapes cover linear chains and branching graphs:
//! - [`Processable`]: one input channel, one output channel.
//! - [`Branch`]: one input, several named outputs (fan-out).
//! - [`Merge`]: several named inputs, one output (fan-in).
//!
//! [`AnyNode`] wraps any of them so the executor can wire and launch them
//! uniformly. Every node runs on its own thread. Channels are moved into
//! `process`, so whatever way `process` exits (return, error, panic) its outputs
//! are dropped and downstream observes end-of-stream.
//!
//! A node's inputs outlive `process`: the node thread keeps a second end of
//! each and discards what still arrives until upstream closes. A dead node
//! therefore never fails its producers' pushes.

use crate::pipeline::channel::{GenericInputChannel, InputChannel, OutputChannel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::handler::ErrorHandler;
use crate::pipeline::message::Payload;
use crate::pipeline::port::{PortDescriptor, DEFAULT_INPUT, DEFAULT_OUTPUT};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use crossbeam_channel::Select;
use std::thread::{self, JoinHandle};

/// A single-input, single-output stage.
pub trait Processable: Send + Sync {
    /// Consume `input` until end-of-stream, pushing results to `output`.
    ///
    /// Returning normally is the only legitimate way out of the loop once the
    /// input is exhausted. Any error is reported to the pipeline's error handler.
    fn process(&self, input: GenericInputChannel, output: OutputChannel) -> anyhow::Result<()>;

    /// Stable name used in logs and fault reports.
    fn name(&self) -> &str;
}

/// A stage bound to one payload type.
///
/// Wrap it in [`Typed`] to use it wherever a [`Processable`] is expected.
pub trait ChannelStage: Send + Sync {
    type Input: Payload;

    fn process(
        &self,
        input: InputChannel<Self::Input>,
        output: OutputChannel,
    ) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Adapter from [`ChannelStage`] to [`Processable`].
pub struct Typed<S>(pub S);

impl<S: ChannelStage> Processable for Typed<S> {
    fn process(&self, input: GenericInputChannel, output: OutputChannel) -> anyhow::Result<()> {
        self.0.process(input.typed::<S::Input>(), output)
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}

/// Fan-out node: one input, named outputs.
pub trait Branch: Send + Sync {
    fn process(
        &self,
        input: GenericInputChannel,
        outputs: BTreeMap<String, OutputChannel>,
    ) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Fan-in node: named inputs, one output.
///
/// How messages from different inputs are combined is up to the implementation.
pub trait Merge: Send + Sync {
    fn process(
        &self,
        inputs: BTreeMap<String, GenericInputChannel>,
        output: OutputChannel,
    ) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Any node the executor can place in the graph.
#[derive(Clone)]
pub enum AnyNode {
    Stage(Arc<dyn Processable>),
    Branch {
        node: Arc<dyn Branch>,
        outputs: Vec<String>,
    },
    Merge {
        node: Arc<dyn Merge>,
        inputs: Vec<String>,
    },
}

impl AnyNode {
    pub fn stage(stage: impl Processable + 'static) -> Self {
        AnyNode::Stage(Arc::new(stage))
    }

    pub fn branch<I, S>(branch: impl Branch + 'static, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnyNode::Branch {
            node: Arc::new(branch),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn merge<I, S>(merge: impl Merge + 'static, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnyNode::Merge {
            node: Arc::new(merge),
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnyNode::Stage(n) => n.name(),
            AnyNode::Branch { node, .. } => node.name(),
            AnyNode::Merge { node, .. } => node.name(),
        }
    }

    pub fn ports(&self) -> Vec<PortDescriptor> {
        match self {
            AnyNode::Stage(_) => vec![
                PortDescriptor::input(DEFAULT_INPUT),
                PortDescriptor::output(DEFAULT_OUTPUT),
            ],
            AnyNode::Branch { outputs, .. } => std::iter::once(PortDescriptor::input(DEFAULT_INPUT))
                .chain(outputs.iter().map(PortDescriptor::output))
                .collect(),
            AnyNode::Merge { inputs, .. } => inputs
                .iter()
                .map(PortDescriptor::input)
                .chain(std::iter::once(PortDescriptor::output(DEFAULT_OUTPUT)))
                .collect(),
        }
    }

    /// Start this node on its own thread with fully wired ports.
    pub(crate) fn launch(
        &self,
        mut inputs: BTreeMap<String, GenericInputChannel>,
        mut outputs: BTreeMap<String, OutputChannel>,
        handler: Arc<dyn ErrorHandler>,
        state: Arc<StateCell>,
    ) -> PipelineResult<JoinHandle<NodeOutcome>> {
        let name = self.name().to_string();
        match self {
            AnyNode::Stage(node) => {
                let input = take_port(&mut inputs, DEFAULT_INPUT, &name)?;
                let output = take_port(&mut outputs, DEFAULT_OUTPUT, &name)?;
                let residue = vec![input.shared()];
                let node = Arc::clone(node);
                spawn_node(name, handler, state, residue, move || node.process(input, output))
            }
            AnyNode::Branch { node, .. } => {
                let input = take_port(&mut inputs, DEFAULT_INPUT, &name)?;
                let residue = vec![input.shared()];
                let node = Arc::clone(node);
                spawn_node(name, handler, state, residue, move || node.process(input, outputs))
            }
            AnyNode::Merge { node, .. } => {
                let output = take_port(&mut outputs, DEFAULT_OUTPUT, &name)?;
                let residue = inputs.values().map(GenericInputChannel::shared).collect();
                let node = Arc::clone(node);
                spawn_node(name, handler, state, residue, move || node.process(inputs, output))
            }
        }
    }
}

impl fmt::Debug for AnyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            AnyNode::Stage(_) => "Stage",
            AnyNode::Branch { .. } => "Branch",
            AnyNode::Merge { .. } => "Merge",
        };
        f.debug_struct("AnyNode")
            .field("kind", &kind)
            .field("name", &self.name())
            .finish()
    }
}

fn take_port<C>(ports: &mut BTreeMap<String, C>, port: &str, node: &str) -> PipelineResult<C> {
    ports.remove(port).ok_or_else(|| {
        PipelineError::PortMismatch(format!("node '{}' has no channel on port '{}'", node, port))
    })
}

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Constructed,
    Running,
    Completed,
    Faulted,
}

/// Thread-safe holder of a [`NodeState`].
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> NodeState {
        match self.0.load(Ordering::Acquire) {
            0 => NodeState::Constructed,
            1 => NodeState::Running,
            2 => NodeState::Completed,
            _ => NodeState::Faulted,
        }
    }

    fn set(&self, state: NodeState) {
        let raw = match state {
            NodeState::Constructed => 0,
            NodeState::Running => 1,
            NodeState::Completed => 2,
            NodeState::Faulted => 3,
        };
        self.0.store(raw, Ordering::Release);
    }
}

/// How a node's thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed,
    Faulted(String),
}

impl NodeOutcome {
    pub fn is_faulted(&self) -> bool {
        matches!(self, NodeOutcome::Faulted(_))
    }
}

/// Run `node` on a dedicated thread.
///
/// The returned handle yields how the node ended. Faults have already been
/// passed to `handler` on the node's thread by then.
pub fn process_async(
    node: Arc<dyn Processable>,
    input: GenericInputChannel,
    output: OutputChannel,
    handler: Arc<dyn ErrorHandler>,
) -> PipelineResult<JoinHandle<NodeOutcome>> {
    let name = node.name().to_string();
    let residue = vec![input.shared()];
    spawn_node(name, handler, Arc::default(), residue, move || node.process(input, output))
}

fn spawn_node<F>(
    name: String,
    handler: Arc<dyn ErrorHandler>,
    state: Arc<StateCell>,
    residue: Vec<GenericInputChannel>,
    body: F,
) -> PipelineResult<JoinHandle<NodeOutcome>>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name(format!("node-{}", name))
        .spawn({
            let name = name.clone();
            move || {
                let outcome = run_node(&name, handler.as_ref(), &state, body);
                discard_residue(&name, residue);
                outcome
            }
        })
        .map_err(|source| PipelineError::Spawn { node: name, source })
}

/// Receive and drop from `inputs` until every one of them is closed.
///
/// All inputs are waited on at once: producers sharing an ancestor may only
/// close one input after the others have made room.
fn discard_residue(name: &str, mut inputs: Vec<GenericInputChannel>) {
    let mut discarded = 0u64;

    while !inputs.is_empty() {
        let closed = {
            let mut select = Select::new();
            for input in &inputs {
                select.recv(input.receiver());
            }
            let oper = select.select();
            let index = oper.index();
            match oper.recv(inputs[index].receiver()) {
                Ok(_) => {
                    discarded += 1;
                    None
                }
                Err(_) => Some(index),
            }
        };
        if let Some(index) = closed {
            inputs.swap_remove(index);
        }
    }

    if discarded > 0 {
        tracing::warn!(node = name, discarded, "Discarded input sent to a finished node");
    }
}

/// Execute a node body, converting panics into faults and reporting faults.
pub(crate) fn run_node<F>(
    name: &str,
    handler: &dyn ErrorHandler,
    state: &StateCell,
    body: F,
) -> NodeOutcome
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let span = tracing::debug_span!("node", name = %name);
    let _enter = span.enter();

    state.set(NodeState::Running);
    tracing::debug!("Node started");

    let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    };

    match result {
        Ok(()) => {
            state.set(NodeState::Completed);
            tracing::debug!("Node finished");
            NodeOutcome::Completed
        }
        Err(fault) => {
            state.set(NodeState::Faulted);
            report_fault(handler, name, &fault);
            NodeOutcome::Faulted(format!("{:#}", fault))
        }
    }
}

fn report_fault(handler: &dyn ErrorHandler, name: &str, fault: &anyhow::Error) {
    let handled = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(name, fault)));
    if handled.is_err() {
        tracing::error!(node = name, "Error handler panicked; aborting process");
        std::process::abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
