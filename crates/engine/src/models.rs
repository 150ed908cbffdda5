//! Workflow file format.
//!
//! A workflow is the canvas snapshot handed to the engine: the node list and
//! the connection list, serialised as camelCase JSON.

use std::path::Path;

use nodes::{Connection, Node};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// A complete pipeline definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        Self {
            name: name.into(),
            nodes,
            connections,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a workflow JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }
}
