//! `PROMPT_INPUT`: collects the user's prompt and publishes it downstream.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map};

use super::{merged_data, parse_data};
use crate::context::NodeContext;
use crate::models::Node;
use crate::ports::{PortSchema, PortType};
use crate::retry::RetryConfig;
use crate::traits::{NodeExecutionResult, NodeService};
use crate::NodeError;

pub const PROMPT_INPUT: &str = "PROMPT_INPUT";

const OUTPUTS: &[PortSchema] = &[
    PortSchema::required("prompt", PortType::String, "Prompt"),
    PortSchema::optional("wordCount", PortType::Number, "Word count"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptInputData {
    #[serde(default)]
    prompt: String,
}

/// Pure data node; there is nothing to retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptInputService;

#[async_trait]
impl NodeService for PromptInputService {
    fn node_type(&self) -> &str {
        PROMPT_INPUT
    }

    fn input_schema(&self) -> &'static [PortSchema] {
        &[]
    }

    fn output_schema(&self) -> &'static [PortSchema] {
        OUTPUTS
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::none()
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeExecutionResult, NodeError> {
        let data: PromptInputData = parse_data(node)?;
        let prompt = data.prompt.trim();
        if prompt.is_empty() {
            return Ok(NodeExecutionResult::failure("prompt must not be empty"));
        }

        let mut outputs = Map::new();
        outputs.insert("prompt".into(), json!(prompt));
        outputs.insert("wordCount".into(), json!(prompt.split_whitespace().count()));

        let published = merged_data(node, outputs.clone());
        ctx.update_data(&node.id, published.clone());

        Ok(NodeExecutionResult::success(Some(published), Some(outputs)))
    }
}
