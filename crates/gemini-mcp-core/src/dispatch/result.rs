//! Requests, results and failure envelopes shared by every transport

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::ai::backend::BackendError;
use crate::ai::retry::{IsRetryable, RetryError};

/// Machine-checkable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UnknownTool,
    InvalidParameters,
    /// Non-retryable backend error (bad request, auth, unusable payload)
    BackendRejected,
    /// Retries exhausted on rate limits or server errors
    BackendUnavailable,
    UnknownMessageType,
    TransportDecodeError,
    /// The caller went away before the call finished
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnknownTool => "UnknownTool",
            FailureKind::InvalidParameters => "InvalidParameters",
            FailureKind::BackendRejected => "BackendRejected",
            FailureKind::BackendUnavailable => "BackendUnavailable",
            FailureKind::UnknownMessageType => "UnknownMessageType",
            FailureKind::TransportDecodeError => "TransportDecodeError",
            FailureKind::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed invocation, as reported to the client
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(FailureKind::UnknownTool, format!("Unknown tool: {}", name))
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidParameters, message)
    }

    pub fn unknown_message_type(message_type: &str) -> Self {
        Self::new(
            FailureKind::UnknownMessageType,
            format!("Unknown message type: {}", message_type),
        )
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportDecodeError, message)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Request cancelled")
    }

    /// Classify a backend error seen outside the retry loop (mid-stream)
    pub fn from_backend(error: &BackendError) -> Self {
        let kind = if error.is_retryable() {
            FailureKind::BackendUnavailable
        } else {
            FailureKind::BackendRejected
        };
        Self::new(kind, error.to_string())
    }
}

impl From<RetryError<BackendError>> for ToolFailure {
    fn from(error: RetryError<BackendError>) -> Self {
        match error {
            RetryError::Exhausted { .. } => {
                Self::new(FailureKind::BackendUnavailable, "Maximum retries exceeded")
            }
            RetryError::Fatal(e) => Self::new(FailureKind::BackendRejected, e.to_string()),
            RetryError::Cancelled => Self::cancelled(),
        }
    }
}

/// A decoded tool invocation, consumed once by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Opaque correlation token echoed back to the client
    pub id: Value,
    pub tool_name: String,
    pub parameters: Value,
}

impl InvocationRequest {
    pub fn new(id: impl Into<Value>, tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Terminal outcome of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success { payload: Value },
    Failure(ToolFailure),
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InvocationResult::Success { .. } => None,
            InvocationResult::Failure(f) => Some(f.kind),
        }
    }

    pub fn into_result(self) -> Result<Value, ToolFailure> {
        match self {
            InvocationResult::Success { payload } => Ok(payload),
            InvocationResult::Failure(f) => Err(f),
        }
    }
}

impl From<Result<Value, ToolFailure>> for InvocationResult {
    fn from(result: Result<Value, ToolFailure>) -> Self {
        match result {
            Ok(payload) => InvocationResult::Success { payload },
            Err(f) => InvocationResult::Failure(f),
        }
    }
}

/// One event of a streamed invocation
///
/// A stream is any number of chunks followed by exactly one `Done` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Done,
    Failed(ToolFailure),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }

    /// JSON body used by the event-stream encodings
    pub fn to_json(&self) -> Value {
        match self {
            StreamEvent::Chunk(text) => json!({ "text": text }),
            StreamEvent::Done => json!({ "done": true }),
            StreamEvent::Failed(failure) => json!({ "error": failure }),
        }
    }
}

/// Render a payload as plain text (strings verbatim, everything else as JSON)
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
