//! Tool registry
//!
//! The catalog is built once at startup and shared read-only (`Arc<ToolCatalog>`)
//! by every transport. Registration order is the order tools are advertised in.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ai::backend::{BackendError, GenerativeBackend, TextStream};
use crate::ai::retry::{with_retry, RetryConfig};
use crate::dispatch::ToolFailure;
use crate::tools::implementations::builtin_tools;

/// Everything a handler needs for one invocation
#[derive(Clone)]
pub struct ToolContext {
    pub backend: Arc<dyn GenerativeBackend>,
    pub retry: RetryConfig,
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Run one backend operation under the retry policy
    ///
    /// Each call gets fresh retry state; nothing is shared between invocations.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ToolFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        with_retry(&self.retry, &self.cancel, operation)
            .await
            .map_err(ToolFailure::from)
    }
}

/// A tool the dispatcher can route to
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Checks the schema cannot express (identifier formats, cross-field rules)
    fn check(&self, _params: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Run the tool to completion
    async fn invoke(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolFailure>;

    /// Open an incremental stream; `None` when the tool has no streaming form
    async fn open_stream(
        &self,
        _params: Value,
        _ctx: &ToolContext,
    ) -> Option<Result<TextStream, ToolFailure>> {
        None
    }
}

/// A registered tool: advertised metadata plus its handler
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn from_handler(handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            parameter_schema: handler.parameters_schema(),
            handler,
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameter_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Wire form of a tool for discovery responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
}

/// Ordered, name-unique set of tools
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the built-in Gemini tools
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for handler in builtin_tools() {
            catalog.register_handler(handler)?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), CatalogError> {
        if self.index.contains_key(&definition.name) {
            return Err(CatalogError::DuplicateTool(definition.name));
        }
        self.index
            .insert(definition.name.clone(), self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    /// Register a handler under its own name
    pub fn register_handler(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), CatalogError> {
        self.register(ToolDefinition::from_handler(handler))
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools in registration order
    pub fn list_all(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(ToolDefinition::descriptor).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
