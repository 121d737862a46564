//! Pipeline-specific error types.

use thiserror::Error;

/// Errors that can occur within the pipeline core.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A typed extraction asked for chunk types the message does not hold.
    #[error("Type mismatch: expected {expected}, message holds [{found}]")]
    TypeMismatch { expected: String, found: String },

    /// Push on a channel whose consumer is gone or that was closed.
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Port mismatch: {0}")]
    PortMismatch(String),

    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid property {key}: {message}")]
    Property { key: String, message: String },

    #[error("Failed to spawn thread for node {node}: {source}")]
    Spawn {
        node: String,
        #[source]
        source: std::io::Error,
    },

    /// The error handler escalated a fault; the pipeline no longer accepts input.
    #[error("Pipeline aborted")]
    Aborted,
}

impl PipelineError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: &[&'static str]) -> Self {
        PipelineError::TypeMismatch {
            expected: expected.into(),
            found: found.join(", "),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
