//! MCP JSON-RPC protocol types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::dispatch::{FailureKind, ToolFailure};

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP revision this server speaks
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Incoming request or notification (notifications carry no `id`)
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` only when the member is absent; `"id": null` is `Some(Null)`
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    /// Error response carrying a failure envelope in `data.kind`
    pub fn failure(id: Value, code: i32, failure: &ToolFailure) -> Self {
        Self::error(
            id,
            code,
            failure.message.clone(),
            Some(json!({ "kind": failure.kind })),
        )
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        let failure = ToolFailure::new(
            FailureKind::UnknownMessageType,
            format!("Method not found: {}", method),
        );
        Self::failure(id, error_codes::METHOD_NOT_FOUND, &failure)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::failure(
            Value::Null,
            error_codes::PARSE_ERROR,
            &ToolFailure::decode(message),
        )
    }

    pub fn invalid_params(id: Value, message: impl Into<String>) -> Self {
        Self::failure(
            id,
            error_codes::INVALID_PARAMS,
            &ToolFailure::invalid_parameters(message),
        )
    }
}

/// `tools/call` params
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    json!({})
}

/// `resources/read` params
#[derive(Debug, Deserialize)]
pub struct ResourceReadParams {
    pub uri: String,
}

/// `notifications/cancelled` params
#[derive(Debug, Deserialize)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: Value,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text { text: String },
}

/// `tools/call` result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<McpContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Tool-level failure; the message is prefixed with its kind
    pub fn failure(failure: &ToolFailure) -> Self {
        Self {
            content: vec![McpContent::Text {
                text: failure.to_string(),
            }],
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_has_no_id() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(request.is_notification());

        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert_eq!(request.id, Some(json!(7)));

        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"tools/call"}"#).unwrap();
        assert!(!request.is_notification());
        assert_eq!(request.id, Some(Value::Null));
    }

    #[test]
    fn test_error_response_shape() {
        let response = JsonRpcResponse::method_not_found(json!(3), "bogus");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["error"]["data"]["kind"], "UnknownMessageType");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_tool_result_omits_is_error_on_success() {
        let json = serde_json::to_value(ToolCallResult::text("4")).unwrap();
        assert_eq!(json, json!({ "content": [{ "type": "text", "text": "4" }] }));

        let failure = ToolFailure::new(FailureKind::BackendUnavailable, "Maximum retries exceeded");
        let json = serde_json::to_value(ToolCallResult::failure(&failure)).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(
            json["content"][0]["text"],
            "BackendUnavailable: Maximum retries exceeded"
        );
    }
}
