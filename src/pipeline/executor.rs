//! Pipeline executor: graph assembly, launch and shutdown.
//!
//! A [`PipelineBuilder`] collects nodes and edges. [`PipelineBuilder::start`]
//! compiles the graph, creates one channel per edge plus one per unconnected
//! port, and launches every node on its own thread. The running [`Pipeline`]
//! owns the producing ends of the entry ports and the consuming ends of the
//! exit ports.
//!
//! Shutdown:
//! 1. Close every entry channel still held by the pipeline.
//! 2. End-of-stream propagates as each node returns and drops its outputs.
//! 3. Join every node thread, sinks first.
//!
//! Exit channels the caller never took are drained and discarded during
//! shutdown, so a node is never faulted just because nobody read its output.
//!
//! A watcher thread closes the held entries the moment the abort signal is
//! raised, so an escalated fault tears the graph down without further input.

use crate::config::PipelineConfig;
use crate::pipeline::channel::{channel, GenericInputChannel, OutputChannel};
use crate::pipeline::compiled_plan::{CompiledPlan, PlanStats};
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::handler::{AbortSignal, ErrorHandler, EscalatingErrorHandler, LoggingErrorHandler};
use crate::pipeline::id::{EdgeId, NodeId};
use crate::pipeline::message::{Message, Payload};
use crate::pipeline::node::{AnyNode, Branch, Merge, NodeOutcome, NodeState, Processable, StateCell};
use crate::pipeline::port::{port_key, PortDirection};
use crate::pipeline::registry::{NodeRegistry, NodeSpec};
use crossbeam_channel::{select, Sender};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Entry ports keyed `node.port`, shared with the abort watcher.
type Entries = Arc<Mutex<BTreeMap<String, OutputChannel>>>;

/// An edge connecting an output port of one node to an input port of another.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub from_node: NodeId,
    pub from_port: String,
    pub to_node: NodeId,
    pub to_port: String,
}

/// A slot holding a node of the graph.
#[derive(Debug, Clone)]
pub struct NodeSlot {
    pub node: AnyNode,
}

impl NodeSlot {
    pub fn new(node: AnyNode) -> Self {
        Self { node }
    }
}

/// Builder for a pipeline graph.
pub struct PipelineBuilder {
    nodes: Vec<NodeSlot>,
    edges: Vec<Edge>,
    capacity: Option<usize>,
    handler: Arc<dyn ErrorHandler>,
    abort: AbortSignal,
}

impl PipelineBuilder {
    /// Empty graph with unbounded channels and a logging error handler.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            capacity: None,
            handler: Arc::new(LoggingErrorHandler),
            abort: AbortSignal::new(),
        }
    }

    /// Build the graph described by `config`, creating nodes through `registry`.
    ///
    /// Without `[[edges]]` the nodes are chained in the order listed. Factories
    /// must name each node after its configured name, since edges refer to it.
    pub fn from_config(config: &PipelineConfig, registry: &NodeRegistry) -> PipelineResult<Self> {
        let mut builder = Self::new().with_capacity(config.channel.capacity);

        for node in &config.nodes {
            let spec = NodeSpec {
                name: &node.name,
                context: &config.context,
                properties: &node.properties,
                inputs: &node.inputs,
                outputs: &node.outputs,
            };
            builder.add_node(registry.create(&node.kind, &spec)?)?;
        }

        if config.edges.is_empty() {
            for i in 1..builder.nodes.len() {
                builder.connect(NodeId(i as u32 - 1), NodeId(i as u32))?;
            }
        } else {
            for edge in &config.edges {
                let from = builder
                    .node_id(&edge.from)
                    .ok_or_else(|| PipelineError::UnknownNode(edge.from.clone()))?;
                let to = builder
                    .node_id(&edge.to)
                    .ok_or_else(|| PipelineError::UnknownNode(edge.to.clone()))?;
                builder.add_edge(from, edge.from_port.as_deref(), to, edge.to_port.as_deref())?;
            }
        }

        tracing::info!(
            "Built pipeline from config: {} nodes, {} edges",
            builder.nodes.len(),
            builder.edges.len()
        );
        Ok(builder)
    }

    /// Channel buffer size. `None` (the default) means unbounded.
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Signal the running pipeline checks before accepting input.
    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    /// Install an [`EscalatingErrorHandler`] wired to this builder's abort signal.
    pub fn escalate_faults(mut self) -> (Self, Arc<EscalatingErrorHandler>) {
        let handler = Arc::new(EscalatingErrorHandler::new(self.abort.clone()));
        self.handler = Arc::clone(&handler) as Arc<dyn ErrorHandler>;
        (self, handler)
    }

    // ── Graph building ──

    /// Add a node. Names must be unique within the graph.
    pub fn add_node(&mut self, node: AnyNode) -> PipelineResult<NodeId> {
        if self.node_id(node.name()).is_some() {
            return Err(PipelineError::DuplicateNode(node.name().to_string()));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeSlot::new(node));
        Ok(id)
    }

    pub fn add_stage(&mut self, stage: impl Processable + 'static) -> PipelineResult<NodeId> {
        self.add_node(AnyNode::stage(stage))
    }

    pub fn add_branch<I, S>(&mut self, branch: impl Branch + 'static, outputs: I) -> PipelineResult<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_node(AnyNode::branch(branch, outputs))
    }

    pub fn add_merge<I, S>(&mut self, merge: impl Merge + 'static, inputs: I) -> PipelineResult<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_node(AnyNode::merge(merge, inputs))
    }

    /// Add `nodes` and connect each to the next.
    pub fn add_chain<I>(&mut self, nodes: I) -> PipelineResult<Vec<NodeId>>
    where
        I: IntoIterator<Item = AnyNode>,
    {
        let mut ids: Vec<NodeId> = Vec::new();
        for node in nodes {
            let id = self.add_node(node)?;
            if let Some(&prev) = ids.last() {
                self.connect(prev, id)?;
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Connect the first free output of `from` to the first free input of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> PipelineResult<EdgeId> {
        self.add_edge(from, None, to, None)
    }

    /// Connect named ports.
    pub fn connect_ports(
        &mut self,
        from: NodeId,
        from_port: &str,
        to: NodeId,
        to_port: &str,
    ) -> PipelineResult<EdgeId> {
        self.add_edge(from, Some(from_port), to, Some(to_port))
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|slot| slot.node.name() == name)
            .map(|idx| NodeId(idx as u32))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Validate the graph and compute its execution plan without starting it.
    pub fn compile(&self) -> PipelineResult<CompiledPlan> {
        PipelineCompiler::compile(&self.nodes, &self.edges)
    }

    /// Launch every node and return the running pipeline.
    pub fn start(self) -> PipelineResult<Pipeline> {
        let plan = self.compile()?;
        tracing::info!(
            "Pipeline compiled: {} nodes, {} edges, {} entries, {} exits ({} us)",
            plan.stats.total_nodes,
            plan.stats.edges,
            plan.entries.len(),
            plan.exits.len(),
            plan.stats.compile_time_us,
        );

        let n = self.nodes.len();
        let mut node_inputs: Vec<BTreeMap<String, GenericInputChannel>> =
            (0..n).map(|_| BTreeMap::new()).collect();
        let mut node_outputs: Vec<BTreeMap<String, OutputChannel>> =
            (0..n).map(|_| BTreeMap::new()).collect();

        for edge in &self.edges {
            let (tx, rx) = channel(self.capacity);
            node_outputs[edge.from_node.index()].insert(edge.from_port.clone(), tx);
            node_inputs[edge.to_node.index()].insert(edge.to_port.clone(), rx);
        }

        let mut inputs = BTreeMap::new();
        for (idx, port) in &plan.entries {
            let (tx, rx) = channel(self.capacity);
            node_inputs[*idx].insert(port.clone(), rx);
            inputs.insert(port_key(self.nodes[*idx].node.name(), port), tx);
        }

        let mut outputs = BTreeMap::new();
        for (idx, port) in &plan.exits {
            let (tx, rx) = channel(self.capacity);
            node_outputs[*idx].insert(port.clone(), tx);
            outputs.insert(port_key(self.nodes[*idx].node.name(), port), rx);
        }

        let inputs: Entries = Arc::new(Mutex::new(inputs));
        let abort_watch = AbortWatch::spawn(&self.abort, Arc::clone(&inputs))?;

        let mut pipeline = Pipeline {
            names: self.nodes.iter().map(|s| s.node.name().to_string()).collect(),
            states: (0..n).map(|_| Arc::new(StateCell::default())).collect(),
            handles: (0..n).map(|_| None).collect(),
            join_order: plan.join_order.clone(),
            inputs,
            outputs,
            abort: self.abort.clone(),
            abort_watch: Some(abort_watch),
            stats: plan.stats.clone(),
        };

        for &idx in &plan.order {
            let launched = self.nodes[idx].node.launch(
                std::mem::take(&mut node_inputs[idx]),
                std::mem::take(&mut node_outputs[idx]),
                Arc::clone(&self.handler),
                Arc::clone(&pipeline.states[idx]),
            );
            match launched {
                Ok(handle) => pipeline.handles[idx] = Some(handle),
                Err(e) => {
                    // Unlaunched nodes' channels must close before the
                    // pipeline joins the nodes already running.
                    drop(node_inputs);
                    drop(node_outputs);
                    tracing::error!("Failed to launch pipeline: {}", e);
                    return Err(e);
                }
            }
        }

        tracing::info!("Pipeline started with {} node threads", n);
        Ok(pipeline)
    }

    // ── Edge validation ──

    fn add_edge(
        &mut self,
        from: NodeId,
        from_port: Option<&str>,
        to: NodeId,
        to_port: Option<&str>,
    ) -> PipelineResult<EdgeId> {
        self.slot(from)?;
        let to_name = self.slot(to)?.node.name().to_string();
        if from == to {
            return Err(PipelineError::InvalidEdge(format!(
                "cannot connect node '{}' to itself",
                to_name
            )));
        }

        let from_port = self.resolve_port(from, from_port, PortDirection::Output)?;
        let to_port = self.resolve_port(to, to_port, PortDirection::Input)?;

        // If `to` can already reach `from`, the new edge closes a loop.
        if self.would_create_cycle(from, to) {
            return Err(PipelineError::CycleDetected);
        }

        let id = EdgeId(self.edges.len() as u32);
        tracing::trace!("Added edge {:?}: {}.{} -> {}.{}", id, from, from_port, to, to_port);
        self.edges.push(Edge {
            id,
            from_node: from,
            from_port,
            to_node: to,
            to_port,
        });
        Ok(id)
    }

    fn slot(&self, id: NodeId) -> PipelineResult<&NodeSlot> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| PipelineError::UnknownNode(id.to_string()))
    }

    /// Pick or validate the port an edge attaches to.
    fn resolve_port(
        &self,
        node: NodeId,
        port: Option<&str>,
        direction: PortDirection,
    ) -> PipelineResult<String> {
        let slot = self.slot(node)?;
        let name = slot.node.name();
        let ports = slot.node.ports();

        match port {
            Some(port) => {
                if !ports.iter().any(|p| p.name == port && p.direction == direction) {
                    return Err(PipelineError::PortMismatch(format!(
                        "node '{}' has no {} port '{}'",
                        name, direction, port
                    )));
                }
                if self.port_in_use(node, port, direction) {
                    return Err(PipelineError::PortMismatch(format!(
                        "{} port '{}' is already connected",
                        direction,
                        port_key(name, port)
                    )));
                }
                Ok(port.to_string())
            }
            None => ports
                .into_iter()
                .find(|p| p.direction == direction && !self.port_in_use(node, &p.name, direction))
                .map(|p| p.name)
                .ok_or_else(|| {
                    PipelineError::PortMismatch(format!(
                        "node '{}' has no free {} port",
                        name, direction
                    ))
                }),
        }
    }

    fn port_in_use(&self, node: NodeId, port: &str, direction: PortDirection) -> bool {
        self.edges.iter().any(|e| match direction {
            PortDirection::Output => e.from_node == node && e.from_port == port,
            PortDirection::Input => e.to_node == node && e.to_port == port,
        })
    }

    /// Check if adding an edge from `from` to `to` would create a cycle.
    fn would_create_cycle(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= self.nodes.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            for edge in &self.edges {
                if edge.from_node == current {
                    stack.push(edge.to_node);
                }
            }
        }
        false
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running pipeline.
///
/// Dropping it performs the same shutdown as [`Pipeline::join`], so it blocks
/// until every node has ended. Entry channels handed out with
/// [`Pipeline::take_input`] must be closed by their holder for that to happen.
pub struct Pipeline {
    names: Vec<String>,
    states: Vec<Arc<StateCell>>,
    handles: Vec<Option<JoinHandle<NodeOutcome>>>,
    join_order: Vec<usize>,
    inputs: Entries,
    /// Exit ports keyed `node.port`, until taken.
    outputs: BTreeMap<String, GenericInputChannel>,
    abort: AbortSignal,
    abort_watch: Option<AbortWatch>,
    stats: PlanStats,
}

impl Pipeline {
    /// Build and start the pipeline described by `config`.
    pub fn from_config(config: &PipelineConfig, registry: &NodeRegistry) -> PipelineResult<Self> {
        PipelineBuilder::from_config(config, registry)?.start()
    }

    // ── Input ──

    /// Push a value into the pipeline's only entry port.
    pub fn push<T: Payload>(&mut self, value: T) -> PipelineResult<()> {
        self.push_message(Message::new(value))
    }

    /// Push a message into the pipeline's only entry port.
    pub fn push_message(&mut self, message: Message) -> PipelineResult<()> {
        let key = self.sole_input()?;
        self.push_to(&key, message)
    }

    /// Push a message into the entry port `key` (`node.port`).
    ///
    /// Fails with [`PipelineError::Aborted`] once the abort signal is raised;
    /// by then the entries are closed.
    pub fn push_to(&mut self, key: &str, message: Message) -> PipelineResult<()> {
        let mut inputs = lock_entries(&self.inputs);
        if self.abort.is_aborted() {
            close_all(&mut inputs);
            return Err(PipelineError::Aborted);
        }
        let input = inputs
            .get(key)
            .ok_or_else(|| PipelineError::PortMismatch(format!("no pipeline input '{}'", key)))?;
        input.push_message(message)
    }

    fn sole_input(&self) -> PipelineResult<String> {
        let inputs = lock_entries(&self.inputs);
        let mut keys = inputs.keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key.clone()),
            _ => Err(PipelineError::PortMismatch(format!(
                "pipeline has {} inputs; push to one by name",
                inputs.len()
            ))),
        }
    }

    /// Whether the entry port `key` is closed. `None` if no such entry is held.
    pub fn is_input_closed(&self, key: &str) -> Option<bool> {
        lock_entries(&self.inputs).get(key).map(OutputChannel::is_closed)
    }

    /// Take ownership of the entry port `key`, e.g. to feed it from another thread.
    ///
    /// A taken entry is no longer closed by shutdown or abort.
    pub fn take_input(&mut self, key: &str) -> Option<OutputChannel> {
        lock_entries(&self.inputs).remove(key)
    }

    /// Close the entry port `key`. Returns false if no such entry is held.
    pub fn close_input(&mut self, key: &str) -> bool {
        match lock_entries(&self.inputs).get_mut(key) {
            Some(input) => {
                input.close();
                true
            }
            None => false,
        }
    }

    /// Close every entry port still held by the pipeline.
    pub fn close_inputs(&mut self) {
        close_all(&mut lock_entries(&self.inputs));
    }

    /// Entry ports still held by the pipeline.
    pub fn input_keys(&self) -> Vec<String> {
        lock_entries(&self.inputs).keys().cloned().collect()
    }

    // ── Output ──

    /// Take the consuming end of the exit port `key`.
    pub fn take_output(&mut self, key: &str) -> Option<GenericInputChannel> {
        self.outputs.remove(key)
    }

    /// Exit ports not yet taken.
    pub fn output_keys(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    // ── Status ──

    pub fn node_state(&self, name: &str) -> Option<NodeState> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.states[idx].get())
    }

    /// State of every node, in the order the nodes were added.
    pub fn node_states(&self) -> Vec<(&str, NodeState)> {
        self.names
            .iter()
            .zip(&self.states)
            .map(|(name, state)| (name.as_str(), state.get()))
            .collect()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// True once every node thread has ended.
    pub fn is_finished(&self) -> bool {
        self.handles
            .iter()
            .flatten()
            .all(|handle| handle.is_finished())
    }

    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    // ── Shutdown ──

    /// Close the entries, wait for every node and report how each ended.
    pub fn join(mut self) -> PipelineReport {
        PipelineReport {
            outcomes: self.shutdown(),
        }
    }

    fn shutdown(&mut self) -> Vec<(String, NodeOutcome)> {
        self.close_inputs();
        if let Some(watch) = self.abort_watch.take() {
            watch.stop();
        }
        let drains = self.drain_untaken_outputs();

        let mut outcomes = Vec::with_capacity(self.handles.len());
        for &idx in &self.join_order {
            let Some(handle) = self.handles[idx].take() else {
                continue;
            };
            let outcome = handle
                .join()
                .unwrap_or_else(|_| NodeOutcome::Faulted("node thread panicked".to_string()));
            outcomes.push((self.names[idx].clone(), outcome));
        }

        for drain in drains {
            let _ = drain.join();
        }

        let faulted = outcomes.iter().filter(|(_, o)| o.is_faulted()).count();
        tracing::info!(
            "Pipeline joined: {} nodes, {} faulted",
            outcomes.len(),
            faulted
        );
        outcomes
    }

    fn drain_untaken_outputs(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.outputs)
            .into_iter()
            .filter_map(|(key, output)| {
                let spawned = thread::Builder::new()
                    .name(format!("drain-{}", key))
                    .spawn({
                        let key = key.clone();
                        move || {
                            let discarded = output.count();
                            if discarded > 0 {
                                tracing::debug!(output = %key, discarded, "Discarded untaken pipeline output");
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::warn!("Failed to spawn drain thread for {}: {}", key, e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.abort_watch.is_some() || self.handles.iter().any(Option::is_some) {
            tracing::debug!("Pipeline dropped while running, shutting down");
            self.shutdown();
        }
    }
}

fn lock_entries(
    entries: &Mutex<BTreeMap<String, OutputChannel>>,
) -> MutexGuard<'_, BTreeMap<String, OutputChannel>> {
    match entries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn close_all(entries: &mut BTreeMap<String, OutputChannel>) {
    for input in entries.values_mut() {
        input.close();
    }
}

/// Thread closing the pipeline's entries when the abort signal is raised.
struct AbortWatch {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl AbortWatch {
    fn spawn(abort: &AbortSignal, entries: Entries) -> PipelineResult<Self> {
        let fired = abort.subscribe();
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("abort-watch".to_string())
            .spawn(move || {
                select! {
                    recv(fired) -> signal => {
                        if signal.is_ok() {
                            tracing::warn!("Abort raised, closing pipeline entries");
                            close_all(&mut lock_entries(&entries));
                        }
                    }
                    recv(stopped) -> _ => {}
                }
            })
            .map_err(|source| PipelineError::Spawn {
                node: "abort-watch".to_string(),
                source,
            })?;

        Ok(Self { stop, handle })
    }

    /// Disconnect the stop channel and wait for the watcher to exit.
    fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            tracing::warn!("Abort watcher panicked");
        }
    }
}

/// How every node of a joined pipeline ended, sinks first.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<(String, NodeOutcome)>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| !o.is_faulted())
    }

    /// `(node, fault)` for every faulted node.
    pub fn faulted(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                NodeOutcome::Faulted(fault) => Some((name.as_str(), fault.as_str())),
                NodeOutcome::Completed => None,
            })
            .collect()
    }

    pub fn outcome(&self, node: &str) -> Option<&NodeOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == node)
            .map(|(_, outcome)| outcome)
    }
}
