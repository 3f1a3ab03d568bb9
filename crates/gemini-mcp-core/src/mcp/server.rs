//! MCP method routing
//!
//! Everything except `tools/call` is answered synchronously. Tool calls are
//! handed back to the transport as [`Routed::Call`] so it can decide how to
//! run them (serially on stdio) while it keeps reading.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::info::ServerInfo;
use super::protocol::{
    error_codes, CancelledParams, JsonRpcRequest, JsonRpcResponse, ResourceReadParams,
    ToolCallParams, ToolCallResult, JSONRPC_VERSION, PROTOCOL_VERSION,
};
use super::resources::{self, ResourceError};
use crate::dispatch::{payload_text, Dispatcher, FailureKind, InvocationRequest, InvocationResult, ToolFailure};
use crate::transport::session::ConnectionSession;

/// What the transport should do with one decoded message
#[derive(Debug)]
pub enum Routed {
    Reply(JsonRpcResponse),
    /// Notifications, and requests whose caller no longer wants an answer
    NoReply,
    /// Run a tool and reply with [`McpServer::call_tool`]
    Call {
        id: Value,
        request: InvocationRequest,
    },
    /// The client gave up on an earlier request
    Cancel { request_id: Value },
}

#[derive(Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
    info: Arc<ServerInfo>,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let info = Arc::new(ServerInfo::from_catalog(dispatcher.catalog()));
        Self { dispatcher, info }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Parse one frame; malformed frames become a ready-made parse error
    pub fn decode(frame: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
        serde_json::from_str(frame).map_err(|e| {
            warn!("Malformed JSON-RPC frame: {}", e);
            JsonRpcResponse::parse_error(format!("Parse error: {}", e))
        })
    }

    pub fn route(&self, session: &mut ConnectionSession, request: JsonRpcRequest) -> Routed {
        let Some(id) = request.id.clone() else {
            return self.route_notification(request);
        };

        if id.is_null() {
            warn!("Rejecting {} with a null id", request.method);
            return Routed::Reply(JsonRpcResponse::failure(
                id,
                error_codes::INVALID_REQUEST,
                &ToolFailure::decode("Request id must not be null"),
            ));
        }

        if request.jsonrpc != JSONRPC_VERSION {
            return Routed::Reply(JsonRpcResponse::failure(
                id,
                error_codes::INVALID_REQUEST,
                &ToolFailure::decode("Invalid JSON-RPC version"),
            ));
        }

        debug!("MCP request {} (id: {})", request.method, id);
        let params = request.params.unwrap_or(Value::Null);

        let response = match request.method.as_str() {
            "initialize" => {
                if let Some(client) = params.get("clientInfo").and_then(|c| c.get("name")) {
                    info!("MCP client connected: {}", client);
                }
                session.mark_server_info_sent();
                JsonRpcResponse::success(id, self.initialize_result())
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({ "tools": self.dispatcher.catalog().descriptors() }),
            ),
            "tools/call" => {
                return match serde_json::from_value::<ToolCallParams>(params) {
                    Ok(call) => Routed::Call {
                        request: InvocationRequest::new(id.clone(), call.name, call.arguments),
                        id,
                    },
                    Err(e) => Routed::Reply(JsonRpcResponse::invalid_params(
                        id,
                        format!("Invalid tools/call params: {}", e),
                    )),
                };
            }
            "resources/list" => {
                JsonRpcResponse::success(id, json!({ "resources": resources::list() }))
            }
            "resources/read" => self.read_resource(id, params),
            other => {
                warn!("Unknown MCP method: {}", other);
                JsonRpcResponse::method_not_found(id, other)
            }
        };
        Routed::Reply(response)
    }

    fn route_notification(&self, request: JsonRpcRequest) -> Routed {
        match request.method.as_str() {
            "notifications/initialized" => {
                debug!("Client finished initialization");
                Routed::NoReply
            }
            "notifications/cancelled" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<CancelledParams>(params) {
                    Ok(cancelled) => {
                        info!(
                            "Client cancelled request {}: {}",
                            cancelled.request_id,
                            cancelled.reason.as_deref().unwrap_or("no reason given")
                        );
                        Routed::Cancel {
                            request_id: cancelled.request_id,
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring malformed cancellation: {}", e);
                        Routed::NoReply
                    }
                }
            }
            other => {
                debug!("Ignoring notification {}", other);
                Routed::NoReply
            }
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": self.info.implementation(),
            "instructions": self.info.description
        })
    }

    fn read_resource(&self, id: Value, params: Value) -> JsonRpcResponse {
        let params: ResourceReadParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::invalid_params(
                    id,
                    format!("Invalid resources/read params: {}", e),
                )
            }
        };
        match resources::read(&params.uri, self.dispatcher.catalog()) {
            Ok(contents) => JsonRpcResponse::success(id, json!({ "contents": [contents] })),
            Err(e @ ResourceError::NotFound(_)) => JsonRpcResponse::invalid_params(id, e.to_string()),
            Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string(), None),
        }
    }

    /// Run a routed tool call and build its response
    ///
    /// Returns `None` when the call was cancelled; the client has already
    /// given up on it.
    pub async fn call_tool(
        &self,
        id: Value,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        match self.dispatcher.handle(request, cancel).await {
            InvocationResult::Success { payload } => {
                Some(result_response(id, &ToolCallResult::text(payload_text(&payload))))
            }
            InvocationResult::Failure(failure) => match failure.kind {
                FailureKind::UnknownTool | FailureKind::InvalidParameters => Some(
                    JsonRpcResponse::failure(id, error_codes::INVALID_PARAMS, &failure),
                ),
                FailureKind::Cancelled => None,
                _ => Some(result_response(id, &ToolCallResult::failure(&failure))),
            },
        }
    }

    /// Route and, for tool calls, run to completion
    pub async fn handle(
        &self,
        session: &mut ConnectionSession,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        match self.route(session, request) {
            Routed::Reply(response) => Some(response),
            Routed::NoReply => None,
            Routed::Cancel { request_id } => {
                session.cancel_call(&request_id);
                None
            }
            Routed::Call { id, request } => {
                let cancel = session.begin_call(&id);
                let response = self.call_tool(id.clone(), request, cancel).await;
                session.finish_call(&id);
                response
            }
        }
    }
}

fn result_response(id: Value, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string(), None),
    }
}
