//! WebSocket transport
//!
//! One session per socket. Calls on a socket run concurrently and answer in
//! completion order, correlated by the client's `id`. Closing the socket
//! cancels every call it still has in flight.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{future, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::{ConnectionSession, TransportKind};
use crate::dispatch::{Dispatcher, InvocationRequest, InvocationResult, StreamEvent, ToolFailure};
use crate::mcp::info::{Capabilities, ServerInfo};
use crate::tools::ToolDescriptor;

#[derive(Debug, Deserialize)]
struct CallFrame {
    id: Value,
    tool: String,
    #[serde(default = "empty_parameters")]
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct CancelFrame {
    id: Value,
}

fn empty_parameters() -> Value {
    json!({})
}

/// Frames sent to the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    ServerInfo {
        name: &'a str,
        version: &'a str,
        description: &'a str,
        capabilities: &'a Capabilities,
    },
    Tools {
        tools: Vec<ToolDescriptor>,
    },
    ToolResult {
        id: Value,
        result: Value,
    },
    ToolError {
        id: Value,
        error: ToolFailure,
    },
    StreamChunk {
        id: Value,
        text: String,
    },
    StreamEnd {
        id: Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        error: ToolFailure,
    },
}

/// Queue one frame for the socket; false once the socket is gone
fn send(outgoing: &mpsc::UnboundedSender<String>, frame: &ServerFrame<'_>) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => outgoing.send(text).is_ok(),
        Err(e) => {
            warn!("Failed to encode WebSocket frame: {}", e);
            true
        }
    }
}

#[derive(Clone)]
pub struct WebSocketAdapter {
    dispatcher: Dispatcher,
    info: Arc<ServerInfo>,
}

impl WebSocketAdapter {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let info = Arc::new(ServerInfo::from_catalog(dispatcher.catalog()));
        Self { dispatcher, info }
    }

    /// Drive one connection until `incoming` ends
    ///
    /// Frames for the client are pushed onto `outgoing`; the caller owns the
    /// actual socket writes.
    pub async fn serve<S>(&self, mut incoming: S, outgoing: mpsc::UnboundedSender<String>)
    where
        S: Stream<Item = String> + Unpin,
    {
        let mut session = ConnectionSession::new(TransportKind::WebSocket);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Value>();
        info!("WebSocket session {} connected", session.id());

        let hello = ServerFrame::ServerInfo {
            name: &self.info.name,
            version: &self.info.version,
            description: &self.info.description,
            capabilities: &self.info.capabilities,
        };
        if send(&outgoing, &hello) {
            session.mark_server_info_sent();
        }

        loop {
            tokio::select! {
                frame = incoming.next() => match frame {
                    Some(text) => self.on_frame(&text, &mut session, &outgoing, &done_tx),
                    None => break,
                },
                Some(id) = done_rx.recv() => session.finish_call(&id),
            }
        }

        info!(
            "WebSocket session {} closed ({} calls in flight)",
            session.id(),
            session.in_flight()
        );
        session.close();
    }

    fn on_frame(
        &self,
        text: &str,
        session: &mut ConnectionSession,
        outgoing: &mpsc::UnboundedSender<String>,
        done: &mpsc::UnboundedSender<Value>,
    ) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Malformed WebSocket frame: {}", e);
                send(
                    outgoing,
                    &ServerFrame::Error {
                        id: None,
                        error: ToolFailure::decode(format!("Invalid JSON: {}", e)),
                    },
                );
                return;
            }
        };

        let id = frame.get("id").cloned();
        let Some(kind) = frame.get("type").and_then(|t| t.as_str()) else {
            send(
                outgoing,
                &ServerFrame::Error {
                    id,
                    error: ToolFailure::decode("Missing message type"),
                },
            );
            return;
        };
        debug!("WebSocket frame: {}", kind);

        match kind {
            "get_tools" => {
                send(
                    outgoing,
                    &ServerFrame::Tools {
                        tools: self.dispatcher.catalog().descriptors(),
                    },
                );
            }
            "tool_call" | "tool_stream" => {
                let call: CallFrame = match serde_json::from_value(frame.clone()) {
                    Ok(call) => call,
                    Err(e) => {
                        send(
                            outgoing,
                            &ServerFrame::Error {
                                id,
                                error: ToolFailure::decode(format!("Invalid {}: {}", kind, e)),
                            },
                        );
                        return;
                    }
                };
                if kind == "tool_call" {
                    self.spawn_call(call, session, outgoing.clone(), done.clone());
                } else {
                    self.spawn_stream(call, session, outgoing.clone(), done.clone());
                }
            }
            "cancel" => match serde_json::from_value::<CancelFrame>(frame.clone()) {
                Ok(cancel) => {
                    if !session.cancel_call(&cancel.id) {
                        debug!("Cancel for {} matched nothing in flight", cancel.id);
                    }
                }
                Err(e) => {
                    send(
                        outgoing,
                        &ServerFrame::Error {
                            id,
                            error: ToolFailure::decode(format!("Invalid cancel: {}", e)),
                        },
                    );
                }
            },
            other => {
                warn!("Unknown WebSocket message type: {}", other);
                send(
                    outgoing,
                    &ServerFrame::Error {
                        id,
                        error: ToolFailure::unknown_message_type(other),
                    },
                );
            }
        }
    }

    fn spawn_call(
        &self,
        call: CallFrame,
        session: &mut ConnectionSession,
        outgoing: mpsc::UnboundedSender<String>,
        done: mpsc::UnboundedSender<Value>,
    ) {
        let cancel = session.begin_call(&call.id);
        let dispatcher = self.dispatcher.clone();
        let CallFrame {
            id,
            tool,
            parameters,
        } = call;

        tokio::spawn(async move {
            let request = InvocationRequest::new(id.clone(), tool, parameters);
            let frame = match dispatcher.handle(request, cancel).await {
                InvocationResult::Success { payload } => ServerFrame::ToolResult {
                    id: id.clone(),
                    result: payload,
                },
                InvocationResult::Failure(error) => ServerFrame::ToolError {
                    id: id.clone(),
                    error,
                },
            };
            send(&outgoing, &frame);
            let _ = done.send(id);
        });
    }

    fn spawn_stream(
        &self,
        call: CallFrame,
        session: &mut ConnectionSession,
        outgoing: mpsc::UnboundedSender<String>,
        done: mpsc::UnboundedSender<Value>,
    ) {
        let cancel = session.begin_stream(&call.id);
        let dispatcher = self.dispatcher.clone();
        let CallFrame {
            id,
            tool,
            parameters,
        } = call;

        tokio::spawn(async move {
            let request = InvocationRequest::new(id.clone(), tool, parameters);
            let mut events = dispatcher.handle_stream(request, cancel);
            while let Some(event) = events.next().await {
                let frame = match event {
                    StreamEvent::Chunk(text) => ServerFrame::StreamChunk {
                        id: id.clone(),
                        text,
                    },
                    StreamEvent::Done => ServerFrame::StreamEnd { id: id.clone() },
                    StreamEvent::Failed(error) => ServerFrame::ToolError {
                        id: id.clone(),
                        error,
                    },
                };
                if !send(&outgoing, &frame) {
                    debug!("Socket gone, abandoning stream {}", id);
                    break;
                }
            }
            let _ = done.send(id);
        });
    }
}

/// Pump an upgraded socket through `adapter`
pub async fn handle_socket(socket: WebSocket, adapter: WebSocketAdapter) {
    let (mut sink, stream) = socket.split();
    let (outgoing, mut frames) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = frames.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let incoming = stream
        .take_while(|message| future::ready(matches!(message, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(text),
                Ok(Message::Binary(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                _ => None,
            })
        });

    adapter.serve(Box::pin(incoming), outgoing).await;
    if let Err(e) = writer.await {
        warn!("WebSocket writer task failed: {}", e);
    }
}
