//! Read-only resources: the model list and the tool catalog

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::tools::ToolCatalog;

pub const MODELS_URI: &str = "gemini://models";
pub const TOOLS_URI: &str = "gemini://tools";

const JSON_MIME: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
}

/// One readable resource body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Unknown resource: {0}")]
    NotFound(String),
    #[error("Failed to render resource {uri}: {message}")]
    Render { uri: String, message: String },
}

struct ModelEntry {
    id: &'static str,
    description: &'static str,
    streaming: bool,
}

const MODELS: &[ModelEntry] = &[
    ModelEntry {
        id: "gemini-2.0-flash",
        description: "Fast multimodal model for everyday tasks",
        streaming: true,
    },
    ModelEntry {
        id: "gemini-2.0-flash-lite",
        description: "Lowest-latency 2.0 model",
        streaming: true,
    },
    ModelEntry {
        id: "gemini-1.5-pro",
        description: "Long-context reasoning model",
        streaming: true,
    },
    ModelEntry {
        id: "gemini-1.5-flash",
        description: "Fast long-context model",
        streaming: true,
    },
];

pub fn list() -> Vec<ResourceDescriptor> {
    vec![
        ResourceDescriptor {
            uri: MODELS_URI,
            name: "Gemini models",
            description: "Models known to this server and whether they stream",
            mime_type: JSON_MIME,
        },
        ResourceDescriptor {
            uri: TOOLS_URI,
            name: "Tool catalog",
            description: "Every tool with its parameter schema",
            mime_type: JSON_MIME,
        },
    ]
}

pub fn uris() -> Vec<&'static str> {
    list().into_iter().map(|r| r.uri).collect()
}

fn models_json() -> Value {
    let models: Vec<Value> = MODELS
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "description": m.description,
                "streaming": m.streaming
            })
        })
        .collect();
    json!({ "models": models })
}

pub fn read(uri: &str, catalog: &ToolCatalog) -> Result<ResourceContents, ResourceError> {
    let body = match uri {
        MODELS_URI => models_json(),
        TOOLS_URI => json!({ "tools": catalog.descriptors() }),
        _ => return Err(ResourceError::NotFound(uri.to_string())),
    };
    let text = serde_json::to_string_pretty(&body).map_err(|e| ResourceError::Render {
        uri: uri.to_string(),
        message: e.to_string(),
    })?;
    Ok(ResourceContents {
        uri: uri.to_string(),
        mime_type: JSON_MIME.to_string(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_models() {
        let catalog = ToolCatalog::builtin().unwrap();
        let contents = read(MODELS_URI, &catalog).unwrap();
        let body: Value = serde_json::from_str(&contents.text).unwrap();
        assert_eq!(body["models"][0]["id"], "gemini-2.0-flash");
        assert_eq!(contents.mime_type, "application/json");
    }

    #[test]
    fn test_read_tools_matches_catalog() {
        let catalog = ToolCatalog::builtin().unwrap();
        let body: Value = serde_json::from_str(&read(TOOLS_URI, &catalog).unwrap().text).unwrap();
        assert_eq!(body["tools"].as_array().unwrap().len(), catalog.len());
        assert_eq!(body["tools"][0]["name"], "ask_gemini");
    }

    #[test]
    fn test_unknown_resource() {
        let catalog = ToolCatalog::new();
        assert_eq!(
            read("gemini://nope", &catalog),
            Err(ResourceError::NotFound("gemini://nope".to_string()))
        );
    }
}
