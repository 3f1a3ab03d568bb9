//! Model Context Protocol server side
//!
//! JSON-RPC 2.0 message types, method routing and the resource catalog.
//! Transports decode frames into [`JsonRpcRequest`]s and hand them to [`McpServer`].

pub mod info;
pub mod protocol;
pub mod resources;
mod server;

pub use info::ServerInfo;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use server::{McpServer, Routed};
