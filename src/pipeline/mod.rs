//! Thread-per-node streaming dataflow pipeline.
//!
//! Independently written stages are connected by channels that carry
//! type-erased [`Message`]s. Every node runs on its own thread; channels are the
//! only synchronization between them.
//!
//! # Architecture
//!
//! ```text
//!            ┌──► [Stage] ──┐
//! [Branch] ──┤              ├──► [Merge] ──► [Stage]
//!            └──► [Stage] ──┘
//! ```
//!
//! # Design
//!
//! - **Type-erased chunks**: a `Message` is an ordered list of `Box<dyn Chunk>`;
//!   typed extraction matches on exact `TypeId`.
//! - **Close is end-of-stream**: dropping or closing an `OutputChannel` ends the
//!   consumer's iteration after the buffered messages drain.
//! - **Faults stay local**: a failing node reports to the `ErrorHandler` and
//!   drops its outputs, so downstream sees end-of-stream. Whatever upstream
//!   still sends it is discarded.
//! - **Graph built once**: `PipelineBuilder` validates edges as they are added;
//!   the compiler orders nodes and finds the unconnected entry and exit ports.

pub mod channel;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod handler;
pub mod id;
pub mod message;
pub mod node;
pub mod nodes;
pub mod port;
pub mod registry;

pub use channel::{
    bounded, channel, unbounded, GenericInputChannel, InputChannel, OutputChannel, PopResult,
    TupleInputChannel,
};
pub use compiled_plan::{CompiledPlan, PlanStats};
pub use error::{PipelineError, PipelineResult};
pub use executor::{Pipeline, PipelineBuilder, PipelineReport};
pub use handler::{AbortSignal, ErrorHandler, EscalatingErrorHandler, FaultRecord, LoggingErrorHandler};
pub use id::{EdgeId, NodeId};
pub use message::{Chunk, ChunkTuple, Message, Payload};
pub use node::{
    process_async, AnyNode, Branch, ChannelStage, Merge, NodeOutcome, NodeState, Processable, Typed,
};
pub use port::{port_key, PortDescriptor, PortDirection};
pub use registry::{NodeFactory, NodeRegistry, NodeSpec};
