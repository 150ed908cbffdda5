//! Execution context: the callbacks through which node services reach the
//! external owner of the canvas state.
//!
//! Defined here (in the nodes crate) so both the engine and individual node
//! implementations can import it without a circular dependency.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::models::{Connection, Node, NodeRunStatus};

/// Callbacks supplied by whoever owns the canonical node store.
///
/// The engine assumes the implementation applies writes atomically.
pub trait ExecutionContext: Send + Sync {
    /// Value published by `from_node_id`, optionally narrowed to one output key.
    fn get_input_data(&self, from_node_id: &str, output_key: Option<&str>) -> Option<Value>;

    fn update_node_status(&self, node_id: &str, status: NodeRunStatus);

    fn update_node_data(&self, node_id: &str, data: Value);
}

// ---------------------------------------------------------------------------
// NodeContext
// ---------------------------------------------------------------------------

/// Per-node view over the run snapshot, handed to [`NodeService`] methods.
///
/// [`NodeService`]: crate::NodeService
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub node_id: &'a str,
    pub nodes: &'a [Node],
    pub connections: &'a [Connection],
    callbacks: &'a dyn ExecutionContext,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node_id: &'a str,
        nodes: &'a [Node],
        connections: &'a [Connection],
        callbacks: &'a dyn ExecutionContext,
    ) -> Self {
        Self {
            node_id,
            nodes,
            connections,
            callbacks,
        }
    }

    pub fn get_input_data(&self, from_node_id: &str, output_key: Option<&str>) -> Option<Value> {
        self.callbacks.get_input_data(from_node_id, output_key)
    }

    pub fn update_status(&self, node_id: &str, status: NodeRunStatus) {
        self.callbacks.update_node_status(node_id, status);
    }

    pub fn update_data(&self, node_id: &str, data: Value) {
        self.callbacks.update_node_data(node_id, data);
    }

    /// One entry per connection ending at `node`, in connection order.
    /// Entries are `None` when the upstream node published nothing.
    pub fn inputs(&self, node: &Node) -> Vec<Option<Value>> {
        self.connections
            .iter()
            .filter(|conn| conn.to == node.id)
            .map(|conn| self.get_input_data(&conn.from, conn.from_port.as_deref()))
            .collect()
    }

    /// First upstream value, for nodes with a single input.
    pub fn single_input(&self, node: &Node) -> Option<Value> {
        self.inputs(node).into_iter().next().flatten()
    }

    /// First upstream value wired into the input port `to_port`.
    pub fn input_for_port(&self, node: &Node, to_port: &str) -> Option<Value> {
        self.connections
            .iter()
            .filter(|conn| conn.to == node.id && conn.to_port_key() == to_port)
            .find_map(|conn| self.get_input_data(&conn.from, conn.from_port.as_deref()))
    }
}

// ---------------------------------------------------------------------------
// MemoryContext
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct NodeRecord {
    status: NodeRunStatus,
    data: Value,
    history: Vec<NodeRunStatus>,
}

/// In-memory node store implementing [`ExecutionContext`].
///
/// Data updates are shallow-merged into the node's data object; a non-object
/// update replaces it. `get_input_data` reads `output_key` from the upstream
/// node's data, or the whole object when no key is given.
#[derive(Debug, Default)]
pub struct MemoryContext {
    records: Mutex<HashMap<String, NodeRecord>>,
}

impl MemoryContext {
    /// Seed the store from the nodes' current status and data.
    pub fn new(nodes: &[Node]) -> Self {
        let records = nodes
            .iter()
            .map(|node| {
                let record = NodeRecord {
                    status: node.status,
                    data: node.data.clone(),
                    history: Vec::new(),
                };
                (node.id.clone(), record)
            })
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn status(&self, node_id: &str) -> Option<NodeRunStatus> {
        self.lock().get(node_id).map(|record| record.status)
    }

    pub fn data(&self, node_id: &str) -> Option<Value> {
        self.lock().get(node_id).map(|record| record.data.clone())
    }

    /// Every status written through `update_node_status`, oldest first.
    pub fn status_history(&self, node_id: &str) -> Vec<NodeRunStatus> {
        self.lock()
            .get(node_id)
            .map(|record| record.history.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NodeRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExecutionContext for MemoryContext {
    fn get_input_data(&self, from_node_id: &str, output_key: Option<&str>) -> Option<Value> {
        let records = self.lock();
        let data = &records.get(from_node_id)?.data;
        let value = match output_key {
            Some(key) => data.get(key)?,
            None => data,
        };
        (!value.is_null()).then(|| value.clone())
    }

    fn update_node_status(&self, node_id: &str, status: NodeRunStatus) {
        let mut records = self.lock();
        let record = records.entry(node_id.to_owned()).or_default();
        record.status = status;
        record.history.push(status);
    }

    fn update_node_data(&self, node_id: &str, data: Value) {
        let mut records = self.lock();
        let record = records.entry(node_id.to_owned()).or_default();
        match (&mut record.data, data) {
            (Value::Object(current), Value::Object(update)) => current.extend(update),
            (slot, data) => *slot = data,
        }
    }
}
