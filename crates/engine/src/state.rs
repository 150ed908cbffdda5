//! Pipeline run state: the object callers poll or subscribe to.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nodes::{Node, NodeRunStatus};
use serde::{Deserialize, Serialize};

/// Failures-map key reserved for a whole-graph structural failure.
pub const CYCLE_FAILURE_KEY: &str = "__cycle__";

/// Lifecycle of one run: `idle → running → (paused ⇄ running) → completed | error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Final failure of one node as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub error: String,
    /// Retries the scheduler performed itself. Retries inside a service's
    /// retry driver are not visible here, so this is `0` for every record
    /// the engine writes.
    pub retry_count: u32,
}

impl FailureRecord {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_count: 0,
        }
    }
}

/// Snapshot of a pipeline run. Values handed out by the engine are owned
/// copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub status: RunStatus,
    /// Flattened topological order. Empty until layering succeeds.
    pub execution_order: Vec<String>,
    /// Exactly one entry per node id.
    pub node_statuses: BTreeMap<String, NodeRunStatus>,
    /// Index of the layer currently admitted.
    pub current_index: usize,
    /// Node id → failure, plus [`CYCLE_FAILURE_KEY`] for a cyclic graph.
    pub failures: BTreeMap<String, FailureRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Idle state with every node `pending`.
    pub fn new(nodes: &[Node]) -> Self {
        Self {
            status: RunStatus::Idle,
            execution_order: Vec::new(),
            node_statuses: nodes
                .iter()
                .map(|node| (node.id.clone(), NodeRunStatus::Pending))
                .collect(),
            current_index: 0,
            failures: BTreeMap::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeRunStatus> {
        self.node_statuses.get(node_id).copied()
    }

    pub fn has_node_errors(&self) -> bool {
        self.node_statuses.values().any(|s| *s == NodeRunStatus::Error)
    }

    /// `true` when the run failed on graph structure rather than on a node.
    pub fn is_structural_failure(&self) -> bool {
        self.failures.contains_key(CYCLE_FAILURE_KEY)
    }

    pub fn count(&self, status: NodeRunStatus) -> usize {
        self.node_statuses.values().filter(|s| **s == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_one_pending_entry_per_node() {
        let nodes = vec![Node::new("a", "x"), Node::new("b", "x"), Node::new("a", "x")];
        let state = RunState::new(&nodes);

        assert_eq!(state.status, RunStatus::Idle);
        assert_eq!(state.node_statuses.len(), 2);
        assert_eq!(state.count(NodeRunStatus::Pending), 2);
        assert!(state.execution_order.is_empty());
        assert!(!state.has_node_errors());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut state = RunState::new(&[Node::new("a", "x")]);
        state.failures.insert(CYCLE_FAILURE_KEY.into(), FailureRecord::new("cycle"));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["nodeStatuses"]["a"], "pending");
        assert_eq!(json["failures"]["__cycle__"]["retryCount"], 0);
        assert!(json.get("executionOrder").is_some());
        assert!(state.is_structural_failure());
    }
}
