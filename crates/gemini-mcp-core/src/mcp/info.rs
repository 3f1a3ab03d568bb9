//! Server identity and capability summary sent on first contact

use serde::Serialize;
use serde_json::{json, Value};

use super::resources;
use crate::tools::ToolCatalog;

pub const SERVER_NAME: &str = "gemini-mcp";
pub const SERVER_DESCRIPTION: &str = "MCP server exposing Google Gemini models as tools";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: Capabilities,
}

/// Names of everything a client can use
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capabilities {
    pub tools: Vec<String>,
    pub resources: Vec<String>,
}

impl ServerInfo {
    pub fn from_catalog(catalog: &ToolCatalog) -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: SERVER_DESCRIPTION.to_string(),
            capabilities: Capabilities {
                tools: catalog.names().into_iter().map(String::from).collect(),
                resources: resources::uris().into_iter().map(String::from).collect(),
            },
        }
    }

    /// `serverInfo` member of the MCP `initialize` result
    pub fn implementation(&self) -> Value {
        json!({ "name": self.name, "version": self.version })
    }
}
