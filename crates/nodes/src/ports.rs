//! Static port declarations used when wiring nodes together.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic tag carried by a port. Tags decide which connections are allowed;
/// they say nothing about the structure of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortType {
    /// Free text. Universally compatible.
    Text,
    String,
    Number,
    Base64Image,
    VideoUrl,
    VideoPrompt,
    StructuredScript,
    StoryboardShots,
    StyleConfig,
    CharAssets,
    SceneAssets,
    PropAssets,
}

impl PortType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::String => "string",
            Self::Number => "number",
            Self::Base64Image => "base64-image",
            Self::VideoUrl => "video-url",
            Self::VideoPrompt => "video-prompt",
            Self::StructuredScript => "structured-script",
            Self::StoryboardShots => "storyboard-shots",
            Self::StyleConfig => "style-config",
            Self::CharAssets => "char-assets",
            Self::SceneAssets => "scene-assets",
            Self::PropAssets => "prop-assets",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input or output slot of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortSchema {
    pub key: &'static str,
    #[serde(rename = "type")]
    pub port_type: PortType,
    pub label: &'static str,
    pub required: bool,
}

impl PortSchema {
    pub const fn required(key: &'static str, port_type: PortType, label: &'static str) -> Self {
        Self { key, port_type, label, required: true }
    }

    pub const fn optional(key: &'static str, port_type: PortType, label: &'static str) -> Self {
        Self { key, port_type, label, required: false }
    }
}

/// Look up a port by key.
pub fn find_port<'a>(schema: &'a [PortSchema], key: &str) -> Option<&'a PortSchema> {
    schema.iter().find(|port| port.key == key)
}
