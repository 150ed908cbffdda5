//! `MockService`: a test double for `NodeService`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use crate::context::NodeContext;
use crate::models::Node;
use crate::ports::PortSchema;
use crate::retry::RetryConfig;
use crate::traits::{NodeExecutionResult, NodeService};
use crate::NodeError;

/// Level-triggered latch used to hold a mock mid-execution.
#[derive(Debug, Clone)]
pub struct Release {
    open: Arc<watch::Sender<bool>>,
}

impl Release {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self { open: Arc::new(open) }
    }

    /// Let every current and future waiter through.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Release {
    fn default() -> Self {
        Self::new()
    }
}

/// Behaviour injected into `MockService` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed and publish these outputs.
    Succeed(Value),
    /// Return a failed result with this message.
    Fail(String),
    /// Raise a `NodeError` with this message.
    Raise(String),
    /// Fail the first `n` attempts for each node, then succeed.
    Flaky(u32),
    /// Block until released, then succeed.
    WaitFor(Release),
}

/// A mock service that records every call it receives.
pub struct MockService {
    node_type: String,
    behaviour: MockBehaviour,
    /// Nodes that always fail with `mock failure: <id>`, whatever the behaviour.
    fail_nodes: HashSet<String>,
    rejection: Option<String>,
    retry: RetryConfig,
    inputs: &'static [PortSchema],
    outputs: &'static [PortSchema],
    /// Node ids seen by `execute` (in call order).
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    pub fn new(node_type: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            node_type: node_type.into(),
            behaviour,
            fail_nodes: HashSet::new(),
            rejection: None,
            retry: RetryConfig::none(),
            inputs: &[],
            outputs: &[],
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding(node_type: impl Into<String>) -> Self {
        Self::new(node_type, MockBehaviour::Succeed(json!({})))
    }

    pub fn failing(node_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(node_type, MockBehaviour::Fail(msg.into()))
    }

    pub fn raising(node_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(node_type, MockBehaviour::Raise(msg.into()))
    }

    pub fn flaky(node_type: impl Into<String>, failures: u32) -> Self {
        Self::new(node_type, MockBehaviour::Flaky(failures))
    }

    pub fn blocking(node_type: impl Into<String>, release: Release) -> Self {
        Self::new(node_type, MockBehaviour::WaitFor(release))
    }

    /// Fail only for the given node ids.
    pub fn failing_for<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_nodes.extend(node_ids.into_iter().map(Into::into));
        self
    }

    /// Reject every node during input validation.
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.rejection = Some(reason.into());
        self
    }

    /// Defaults to [`RetryConfig::none`] so tests stay fast.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ports(mut self, inputs: &'static [PortSchema], outputs: &'static [PortSchema]) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    /// Number of times `execute` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of `execute` calls for one node.
    pub fn calls_for(&self, node_id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|id| *id == node_id).count()
    }

    /// Node ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn succeed(&self, node: &Node, outputs: &Value) -> NodeExecutionResult {
        let mut published = Map::new();
        published.insert("node".into(), json!(node.id));
        if let Some(extra) = outputs.as_object() {
            published.extend(extra.clone());
        }
        NodeExecutionResult::success(Some(Value::Object(published.clone())), Some(published))
    }
}

#[async_trait]
impl NodeService for MockService {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn input_schema(&self) -> &'static [PortSchema] {
        self.inputs
    }

    fn output_schema(&self) -> &'static [PortSchema] {
        self.outputs
    }

    fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    fn validate_inputs(&self, _node: &Node, _ctx: &NodeContext<'_>) -> Result<(), Vec<String>> {
        match &self.rejection {
            Some(reason) => Err(vec![reason.clone()]),
            None => Ok(()),
        }
    }

    async fn execute(
        &self,
        node: &Node,
        _ctx: &NodeContext<'_>,
    ) -> Result<NodeExecutionResult, NodeError> {
        let previous_calls = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|id| **id == node.id).count();
            calls.push(node.id.clone());
            previous
        };

        if self.fail_nodes.contains(&node.id) {
            return Ok(NodeExecutionResult::failure(format!("mock failure: {}", node.id)));
        }

        match &self.behaviour {
            MockBehaviour::Succeed(outputs) => Ok(self.succeed(node, outputs)),
            MockBehaviour::Fail(msg) => Ok(NodeExecutionResult::failure(msg.clone())),
            MockBehaviour::Raise(msg) => Err(NodeError::Failed(msg.clone())),
            MockBehaviour::Flaky(failures) => {
                if previous_calls < *failures as usize {
                    Ok(NodeExecutionResult::failure(format!(
                        "transient failure {} for {}",
                        previous_calls + 1,
                        node.id
                    )))
                } else {
                    Ok(self.succeed(node, &Value::Null))
                }
            }
            MockBehaviour::WaitFor(release) => {
                release.wait().await;
                Ok(self.succeed(node, &Value::Null))
            }
        }
    }
}
