//! Engine-level error types.

use nodes::PortType;
use thiserror::Error;

/// Errors produced while loading or laying out a pipeline graph.
///
/// Per-node failures are never reported through this type; they are
/// recorded in the run state.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// Topological layering could not consume every node.
    #[error("pipeline contains a cycle involving nodes: {}", .node_ids.join(", "))]
    CycleDetected { node_ids: Vec<String> },

    // ------ Workflow file errors ------

    #[error("failed to read workflow file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workflow definition: {0}")]
    InvalidWorkflow(#[from] serde_json::Error),
}

/// Reasons a proposed connection is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// A connection endpoint names a node that is not on the canvas.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNode {
        node_id: String,
        side: &'static str,
    },

    #[error("node '{0}' cannot connect to itself")]
    SelfLoop(String),

    #[error("connection {from} -> {to} already exists")]
    Duplicate { from: String, to: String },

    #[error("incompatible port types: {from_type} -> {to_type}")]
    IncompatiblePorts {
        from_type: PortType,
        to_type: PortType,
    },
}
