//! Pipeline execution engine.
//!
//! `PipelineEngine` is the central orchestrator:
//! 1. Lays the graph out in dependency layers; a cycle fails the whole run
//!    before any node executes.
//! 2. Admits layers one at a time through the pause gate.
//! 3. Runs every node of a layer concurrently and waits for all of them,
//!    whatever their outcome.
//! 4. Keeps going after node failures: every layer is attempted, and the
//!    run ends `error` if any node ended `error`.
//!
//! One engine drives exactly one run; build a new engine to run again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use nodes::{
    run_with_retry, Connection, ExecutionContext, Node, NodeContext, NodeRunStatus, PauseGate,
    RetryConfig, ServiceRegistry,
};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::state::{FailureRecord, RunState, RunStatus, CYCLE_FAILURE_KEY};
use crate::topology;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Replaces every service's own [`RetryConfig`] for this run.
    pub retry_override: Option<RetryConfig>,
}

// ---------------------------------------------------------------------------
// PipelineEngine
// ---------------------------------------------------------------------------

/// Runs one pipeline over an immutable snapshot of nodes and connections.
///
/// Share it behind an `Arc` to call [`pause`](Self::pause),
/// [`resume`](Self::resume) or [`get_state`](Self::get_state) while
/// [`run`](Self::run) is in flight.
pub struct PipelineEngine {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    connections: Vec<Connection>,
    registry: Arc<ServiceRegistry>,
    context: Arc<dyn ExecutionContext>,
    config: EngineConfig,
    gate: PauseGate,
    state: watch::Sender<RunState>,
}

impl PipelineEngine {
    pub fn new(
        nodes: Vec<Node>,
        connections: Vec<Connection>,
        registry: Arc<ServiceRegistry>,
        context: Arc<dyn ExecutionContext>,
    ) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            index.entry(node.id.clone()).or_insert(position);
        }
        let (state, _) = watch::channel(RunState::new(&nodes));

        Self {
            nodes,
            index,
            connections,
            registry,
            context,
            config: EngineConfig::default(),
            gate: PauseGate::new(),
            state,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the pipeline to completion and return the settled state.
    ///
    /// Node failures never surface as errors here; inspect
    /// [`RunState::failures`]. Calling `run` on an engine that has already
    /// started returns the current state without doing anything.
    #[instrument(skip(self), fields(nodes = self.nodes.len(), connections = self.connections.len()))]
    pub async fn run(&self) -> RunState {
        let started = self.state.send_if_modified(|state| {
            if state.status != RunStatus::Idle {
                return false;
            }
            state.status = RunStatus::Running;
            state.started_at = Some(Utc::now());
            true
        });
        if !started {
            warn!("pipeline already started; build a new engine to run again");
            return self.get_state();
        }

        let layers = match topology::build_layers(&self.nodes, &self.connections) {
            Ok(layers) => layers,
            Err(err) => {
                error!("refusing to run pipeline: {err}");
                self.state.send_modify(|state| {
                    state.status = RunStatus::Error;
                    state
                        .failures
                        .insert(CYCLE_FAILURE_KEY.to_owned(), FailureRecord::new(err.to_string()));
                    state.completed_at = Some(Utc::now());
                });
                return self.get_state();
            }
        };

        let order = topology::flatten(&layers);
        info!("executing {} nodes in {} layers: {:?}", order.len(), layers.len(), order);
        self.state.send_modify(|state| state.execution_order = order);

        for (index, layer) in layers.iter().enumerate() {
            self.state.send_modify(|state| state.current_index = index);
            self.gate.wait_until_resumed().await;

            debug!(layer = index, size = layer.len(), "admitting layer");
            join_all(layer.iter().map(|node_id| self.execute_node(node_id))).await;
        }

        // A pause issued during the last layer holds the final transition.
        // `Running` under the state lock implies an open gate.
        loop {
            self.gate.wait_until_resumed().await;
            let settled = self.state.send_if_modified(|state| {
                if state.status != RunStatus::Running {
                    return false;
                }
                state.status = if state.has_node_errors() {
                    RunStatus::Error
                } else {
                    RunStatus::Completed
                };
                state.completed_at = Some(Utc::now());
                true
            });
            if settled {
                break;
            }
        }

        let state = self.get_state();
        info!(
            "pipeline finished with status {:?} ({} succeeded, {} failed)",
            state.status,
            state.count(NodeRunStatus::Success),
            state.count(NodeRunStatus::Error)
        );
        state
    }

    /// Stop admitting layers and attempts. Attempts already in flight run to
    /// completion. Returns `false` unless the run was `running`.
    pub fn pause(&self) -> bool {
        let paused = self.transition(RunStatus::Running, RunStatus::Paused, || self.gate.pause());
        if paused {
            info!("pipeline paused");
        }
        paused
    }

    /// Returns `false` unless the run was `paused`.
    pub fn resume(&self) -> bool {
        let resumed = self.transition(RunStatus::Paused, RunStatus::Running, || self.gate.resume());
        if resumed {
            info!("pipeline resumed");
        }
        resumed
    }

    /// Reclassify a failed node as `skipped` and let a paused run continue.
    ///
    /// Only a node currently in `error` changes; anything else is a no-op
    /// returning `false`. Once the run has settled, skipping its last failed
    /// node turns an `error` run into `completed`. A cycle failure is never
    /// cleared.
    pub fn skip_and_continue(&self, node_id: &str) -> bool {
        let skipped = self.state.send_if_modified(|state| {
            match state.node_statuses.get_mut(node_id) {
                Some(status) if *status == NodeRunStatus::Error => *status = NodeRunStatus::Skipped,
                _ => return false,
            }
            if state.status == RunStatus::Error
                && !state.is_structural_failure()
                && !state.has_node_errors()
            {
                state.status = RunStatus::Completed;
            }
            true
        });
        if !skipped {
            return false;
        }

        info!(node_id, "node skipped");
        self.context.update_node_status(node_id, NodeRunStatus::Skipped);
        self.resume();
        true
    }

    /// Owned snapshot of the current state.
    pub fn get_state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Move the run from `from` to `to`, flipping the gate while the state
    /// lock is held so the two never disagree.
    fn transition(&self, from: RunStatus, to: RunStatus, flip_gate: impl FnOnce()) -> bool {
        self.state.send_if_modified(|state| {
            if state.status != from {
                return false;
            }
            state.status = to;
            flip_gate();
            true
        })
    }

    fn set_node_status(&self, node_id: &str, status: NodeRunStatus, error: Option<String>) {
        self.state.send_modify(|state| {
            state.node_statuses.insert(node_id.to_owned(), status);
            if let Some(error) = error {
                state.failures.insert(node_id.to_owned(), FailureRecord::new(error));
            }
        });
    }

    #[instrument(skip(self))]
    async fn execute_node(&self, node_id: &str) {
        let Some(node) = self.index.get(node_id).map(|&position| &self.nodes[position]) else {
            return;
        };

        let Some(service) = self.registry.get(&node.node_type) else {
            let message = format!("no service registered for node type '{}'", node.node_type);
            warn!("node '{}': {}", node_id, message);
            self.context.update_node_status(node_id, NodeRunStatus::Error);
            self.set_node_status(node_id, NodeRunStatus::Error, Some(message));
            return;
        };

        self.set_node_status(node_id, NodeRunStatus::Running, None);

        let retry = self.config.retry_override.unwrap_or_else(|| service.retry_config());
        let ctx = NodeContext::new(node_id, &self.nodes, &self.connections, self.context.as_ref());
        let result = run_with_retry(service.as_ref(), node, &ctx, &retry, &self.gate).await;

        if result.success {
            info!("node '{}' succeeded", node_id);
            self.set_node_status(node_id, NodeRunStatus::Success, None);
        } else {
            let message = result.error.unwrap_or_else(|| "unknown error".to_owned());
            error!("node '{}' failed: {}", node_id, message);
            self.set_node_status(node_id, NodeRunStatus::Error, Some(message));
        }
    }
}
