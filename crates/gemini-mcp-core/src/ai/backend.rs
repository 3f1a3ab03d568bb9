//! Backend client facade
//!
//! The single seam between the dispatcher and the generative-model service.
//! Implementations translate requests and responses; they never retry.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use super::types::{ConversationTurn, FunctionDeclaration, FunctionOutcome, GenerationOptions};

/// Lazily produced text chunks from a streaming call
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Failure reported by a backend call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered with a non-success HTTP status
    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response (connect failure, timeout, reset)
    #[error("backend unreachable: {message}")]
    Network { message: String },

    /// The backend answered but the payload could not be understood
    #[error("malformed backend response: {message}")]
    Decode { message: String },
}

impl BackendError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Operations the dispatcher can ask of the generative-model backend
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Single prompt, full text answer
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;

    /// Single prompt, answer streamed as text chunks
    ///
    /// The outer result covers opening the stream; failures after the first
    /// chunk surface as `Err` items inside the stream.
    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream, BackendError>;

    /// Continue `history` with one new user `message`
    async fn chat_turn(
        &self,
        model: &str,
        history: &[ConversationTurn],
        message: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;

    /// Prompt with function declarations attached
    async fn invoke_with_functions(
        &self,
        model: &str,
        prompt: &str,
        functions: &[FunctionDeclaration],
        options: &GenerationOptions,
    ) -> Result<FunctionOutcome, BackendError>;
}
