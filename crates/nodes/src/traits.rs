//! The `NodeService` trait: the contract every node type must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::NodeContext;
use crate::models::Node;
use crate::ports::PortSchema;
use crate::retry::RetryConfig;
use crate::NodeError;

/// Outcome of one `execute` attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub success: bool,
    /// Service-internal data, usually what was written back to the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Named values for downstream consumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeExecutionResult {
    pub fn success(data: Option<Value>, outputs: Option<Map<String, Value>>) -> Self {
        Self {
            success: true,
            data,
            outputs,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Business logic bound to one node type.
///
/// Implementations only describe a single attempt. Retries, backoff, pause
/// handling and status transitions are applied by
/// [`run_with_retry`](crate::retry::run_with_retry).
#[async_trait]
pub trait NodeService: Send + Sync {
    /// The type tag this service is registered under.
    fn node_type(&self) -> &str;

    fn input_schema(&self) -> &'static [PortSchema];

    fn output_schema(&self) -> &'static [PortSchema];

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
    }

    /// Checked once before the first attempt. A rejection is terminal and
    /// consumes no retries.
    fn validate_inputs(&self, _node: &Node, _ctx: &NodeContext<'_>) -> Result<(), Vec<String>> {
        Ok(())
    }

    /// Run one attempt. Both `Err` and a result with `success == false`
    /// count as a failed attempt.
    async fn execute(
        &self,
        node: &Node,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeExecutionResult, NodeError>;
}
