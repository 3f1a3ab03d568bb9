//! Generative-model backend: facade, Gemini client, wire format and retry policy

pub mod backend;
pub mod client;
pub mod format;
pub mod retry;
pub mod sse;
pub mod types;

pub use backend::{BackendError, GenerativeBackend, TextStream};
pub use client::{GeminiClient, GeminiClientConfig};
pub use types::{ConversationTurn, FunctionDeclaration, FunctionOutcome, GenerationOptions, Role};
