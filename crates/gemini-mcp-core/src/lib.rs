//! gemini-mcp core library
//!
//! Tool catalog, Gemini backend client with retry, the transport-agnostic
//! dispatcher and the MCP / WebSocket / HTTP adapters built on top of it.

pub mod ai;
pub mod config;
pub mod dispatch;
pub mod mcp;
pub mod tools;
pub mod transport;

pub use config::{Config, ConfigError};
pub use dispatch::{Dispatcher, FailureKind, InvocationRequest, InvocationResult, StreamEvent};
pub use tools::ToolCatalog;
