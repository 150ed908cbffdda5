//! Built-in node services that need no external API.
//!
//! Generation, extraction and platform-submission nodes live with the host
//! application and are registered next to these.

mod prompt_input;
mod style_preset;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use prompt_input::{PromptInputService, PROMPT_INPUT};
pub use style_preset::{StylePresetService, StyleTemplate, BUILT_IN_TEMPLATES, STYLE_PRESET};

use crate::models::Node;
use crate::registry::ServiceRegistry;
use crate::NodeError;

/// Register every built-in service. Call once at startup.
pub fn register_builtin_services(registry: &mut ServiceRegistry) {
    registry.register_service(Arc::new(PromptInputService));
    registry.register_service(Arc::new(StylePresetService));
}

/// Parse a node's payload into the service's schema; `null` yields the default.
fn parse_data<T: DeserializeOwned + Default>(node: &Node) -> Result<T, NodeError> {
    if node.data.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(node.data.clone())?)
}

/// The node's data object with `fields` merged on top.
fn merged_data(node: &Node, fields: serde_json::Map<String, Value>) -> Value {
    let mut data = node.data.as_object().cloned().unwrap_or_default();
    data.extend(fields);
    Value::Object(data)
}
