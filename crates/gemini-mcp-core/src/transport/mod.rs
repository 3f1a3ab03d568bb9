//! Transport adapters
//!
//! Each adapter decodes its framing, hands invocations to the shared
//! [`Dispatcher`](crate::dispatch::Dispatcher) and encodes the results back.

pub mod cancellation;
pub mod http;
pub mod session;
pub mod stdio;
pub mod websocket;

pub use session::{ConnectionSession, TransportKind};
pub use stdio::StdioTransport;
pub use websocket::WebSocketAdapter;
