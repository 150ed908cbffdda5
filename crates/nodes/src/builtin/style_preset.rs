//! `STYLE_PRESET`: resolves a visual style from a built-in template, an
//! optional override and optional upstream text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{merged_data, parse_data};
use crate::context::NodeContext;
use crate::models::Node;
use crate::ports::{PortSchema, PortType};
use crate::retry::RetryConfig;
use crate::traits::{NodeExecutionResult, NodeService};
use crate::NodeError;

pub const STYLE_PRESET: &str = "STYLE_PRESET";

const INPUTS: &[PortSchema] = &[PortSchema::optional("text", PortType::Text, "Style description")];

const OUTPUTS: &[PortSchema] = &[PortSchema::required("style", PortType::StyleConfig, "Style config")];

/// A named set of prompt fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub visual_style: &'static str,
    pub fragments: &'static [&'static str],
    pub negative_prompt: &'static str,
}

pub const BUILT_IN_TEMPLATES: &[StyleTemplate] = &[
    StyleTemplate {
        id: "real_cinematic",
        name: "Cinematic realism",
        visual_style: "REAL",
        fragments: &[
            "cinematic, photorealistic, 8k",
            "35mm anamorphic lens, shallow depth of field",
            "dramatic composition",
            "natural lighting, golden hour",
        ],
        negative_prompt: "cartoon, anime, illustration, low quality",
    },
    StyleTemplate {
        id: "anime_standard",
        name: "Anime",
        visual_style: "ANIME",
        fragments: &[
            "masterpiece, best quality, anime style",
            "dynamic angle",
            "detailed background, vibrant colors",
            "cel shading, soft shadows",
        ],
        negative_prompt: "realistic, photo, 3d render, low quality",
    },
    StyleTemplate {
        id: "3d_stylized",
        name: "Stylized 3D",
        visual_style: "3D",
        fragments: &["stylized 3D render, stylized characters, vibrant lighting"],
        negative_prompt: "realistic, photo, 2d, flat",
    },
    StyleTemplate {
        id: "cyberpunk",
        name: "Cyberpunk",
        visual_style: "REAL",
        fragments: &[
            "cyberpunk, neon, futuristic",
            "wide angle, dutch angle",
            "neon-lit streets, holographic displays, rain-soaked",
            "neon rim lighting, volumetric fog, cyan and magenta",
        ],
        negative_prompt: "natural, pastoral, bright daylight, cartoon",
    },
];

fn find_template(id: &str) -> Option<&'static StyleTemplate> {
    BUILT_IN_TEMPLATES.iter().find(|t| t.id == id)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StylePresetData {
    template_id: Option<String>,
    /// Replaces the template's fragments when set.
    style_prompt: Option<String>,
    negative_prompt: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StylePresetService;

impl StylePresetService {
    fn template(data: &StylePresetData) -> Option<&'static StyleTemplate> {
        find_template(data.template_id.as_deref().unwrap_or(BUILT_IN_TEMPLATES[0].id))
    }
}

#[async_trait]
impl NodeService for StylePresetService {
    fn node_type(&self) -> &str {
        STYLE_PRESET
    }

    fn input_schema(&self) -> &'static [PortSchema] {
        INPUTS
    }

    fn output_schema(&self) -> &'static [PortSchema] {
        OUTPUTS
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::none()
    }

    fn validate_inputs(&self, node: &Node, _ctx: &NodeContext<'_>) -> Result<(), Vec<String>> {
        let data: StylePresetData = parse_data(node).map_err(|e| vec![e.to_string()])?;
        match Self::template(&data) {
            Some(_) => Ok(()),
            None => Err(vec![format!(
                "unknown style template '{}'",
                data.template_id.unwrap_or_default()
            )]),
        }
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeExecutionResult, NodeError> {
        let data: StylePresetData = parse_data(node)?;
        let template = Self::template(&data).ok_or_else(|| {
            NodeError::Failed(format!(
                "unknown style template '{}'",
                data.template_id.clone().unwrap_or_default()
            ))
        })?;

        let mut parts: Vec<String> = match data.style_prompt.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => vec![custom.to_owned()],
            _ => template.fragments.iter().map(|f| (*f).to_owned()).collect(),
        };
        if let Some(Value::String(text)) = ctx.input_for_port(node, "text") {
            if !text.trim().is_empty() {
                parts.push(text.trim().to_owned());
            }
        }

        let style = json!({
            "templateId": template.id,
            "visualStyle": template.visual_style,
            "stylePrompt": parts.join(", "),
            "negativePrompt": data.negative_prompt.as_deref().unwrap_or(template.negative_prompt),
        });

        let mut outputs = Map::new();
        outputs.insert("style".into(), style);

        let published = merged_data(node, outputs.clone());
        ctx.update_data(&node.id, published.clone());

        Ok(NodeExecutionResult::success(Some(published), Some(outputs)))
    }
}
