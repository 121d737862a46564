//! # flowline: thread-per-node streaming pipelines
//!
//! Processing stages are written against two channel ends and know nothing
//! about each other. The pipeline wires them into a graph, runs each on its own
//! thread and tears the graph down by closing channels.
//!
//! ## Architecture
//!
//! - **Pipeline**: messages, channels, nodes, error handlers and graph assembly
//! - **Config**: TOML/JSON pipeline descriptions, node properties and context
//!
//! ## Example
//!
//! ```no_run
//! use flowline::pipeline::{nodes::MapStage, AnyNode, PipelineBuilder, Typed};
//!
//! # fn main() -> flowline::pipeline::PipelineResult<()> {
//! let mut builder = PipelineBuilder::new();
//! builder.add_chain([
//!     AnyNode::stage(Typed(MapStage::new("parse", |s: String| Ok(s.trim().parse::<i64>()?)))),
//!     AnyNode::stage(Typed(MapStage::new("square", |n: i64| Ok(n * n)))),
//! ])?;
//!
//! let mut pipeline = builder.start()?;
//! let squares = pipeline.take_output("square.out").expect("exit port");
//! pipeline.push(String::from("12"))?;
//!
//! let report = pipeline.join();
//! assert!(report.is_success());
//! assert_eq!(squares.typed::<i64>().next().transpose()?, Some(144));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Context, PipelineConfig, Properties};
pub use error::{FlowError, Result};
pub use pipeline::{Message, Pipeline, PipelineBuilder, PipelineError};
