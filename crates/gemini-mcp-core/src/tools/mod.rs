//! Tool catalog, parameter validation and the built-in tools

pub mod implementations;
pub mod registry;
pub mod schema;

pub use registry::{
    CatalogError, ToolCatalog, ToolContext, ToolDefinition, ToolDescriptor, ToolHandler,
};
pub use schema::{validate, SchemaViolation};
