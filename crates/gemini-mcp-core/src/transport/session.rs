//! Per-connection state
//!
//! A session is owned by exactly one adapter task. Dropping or closing it
//! cancels every call it still has in flight.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::cancellation::SessionCancellation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    WebSocket,
    Http,
    EventStream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::WebSocket => "websocket",
            TransportKind::Http => "http",
            TransportKind::EventStream => "event-stream",
        };
        f.write_str(name)
    }
}

/// Correlation ids are compared by their JSON text, so `1` and `"1"` differ
fn call_key(id: &Value) -> String {
    id.to_string()
}

pub struct ConnectionSession {
    id: Uuid,
    transport: TransportKind,
    sent_server_info: bool,
    open_streams: HashSet<String>,
    in_flight: HashMap<String, CancellationToken>,
    cancellation: SessionCancellation,
}

impl ConnectionSession {
    pub fn new(transport: TransportKind) -> Self {
        let id = Uuid::new_v4();
        debug!("Session {} opened ({})", id, transport);
        Self {
            id,
            transport,
            sent_server_info: false,
            open_streams: HashSet::new(),
            in_flight: HashMap::new(),
            cancellation: SessionCancellation::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn sent_server_info(&self) -> bool {
        self.sent_server_info
    }

    pub fn mark_server_info_sent(&mut self) {
        self.sent_server_info = true;
    }

    /// Register a call and hand out its cancellation token
    ///
    /// Reusing the id of a call still in flight replaces the tracked token;
    /// the earlier call keeps running until it finishes or the session closes.
    pub fn begin_call(&mut self, id: &Value) -> CancellationToken {
        let token = self.cancellation.child_token();
        self.in_flight.insert(call_key(id), token.clone());
        token
    }

    /// Like [`begin_call`](Self::begin_call), also tracking the call as an open stream
    pub fn begin_stream(&mut self, id: &Value) -> CancellationToken {
        self.open_streams.insert(call_key(id));
        self.begin_call(id)
    }

    pub fn finish_call(&mut self, id: &Value) {
        let key = call_key(id);
        self.in_flight.remove(&key);
        self.open_streams.remove(&key);
    }

    /// Cancel one call; returns whether it was in flight
    pub fn cancel_call(&mut self, id: &Value) -> bool {
        let key = call_key(id);
        self.open_streams.remove(&key);
        match self.in_flight.remove(&key) {
            Some(token) => {
                token.cancel();
                debug!("Session {} cancelled call {}", self.id, key);
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.len()
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel everything still running
    pub fn close(&mut self) {
        if !self.is_closed() {
            debug!(
                "Session {} closed with {} calls in flight",
                self.id,
                self.in_flight.len()
            );
        }
        self.cancellation.cancel();
        self.in_flight.clear();
        self.open_streams.clear();
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}
