//! Graph data handed to the engine by the external owner (the canvas store).
//!
//! The engine only reads a node's identity and type; `data` is an opaque
//! per-type payload that each node service parses with its own schema.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Port key assumed when a connection does not name one.
pub const DEFAULT_PORT: &str = "default";

// ---------------------------------------------------------------------------
// NodeRunStatus
// ---------------------------------------------------------------------------

/// Per-run status of a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,
    /// An `Error` the user chose to ignore.
    Skipped,
}

impl NodeRunStatus {
    /// `true` once the node will not change again during this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single node on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the graph (referenced by connections).
    pub id: String,
    /// Selects the registered node service.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub status: NodeRunStatus,
    /// Opaque payload owned by the node's service.
    #[serde(default)]
    pub data: Value,
    /// Declared upstream node ids.
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            status: NodeRunStatus::Pending,
            data: Value::Null,
            inputs: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed edge from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<String>,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            from_port: None,
            to_port: None,
        }
    }

    pub fn with_ports(mut self, from_port: impl Into<String>, to_port: impl Into<String>) -> Self {
        self.from_port = Some(from_port.into());
        self.to_port = Some(to_port.into());
        self
    }

    /// Output port key, falling back to [`DEFAULT_PORT`].
    pub fn from_port_key(&self) -> &str {
        self.from_port.as_deref().unwrap_or(DEFAULT_PORT)
    }

    /// Input port key, falling back to [`DEFAULT_PORT`].
    pub fn to_port_key(&self) -> &str {
        self.to_port.as_deref().unwrap_or(DEFAULT_PORT)
    }

    /// Same `(from, to, fromPort, toPort)` tuple, with unnamed ports
    /// treated as [`DEFAULT_PORT`].
    pub fn same_edge(&self, other: &Connection) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.from_port_key() == other.from_port_key()
            && self.to_port_key() == other.to_port_key()
    }
}
