//! Simple (non-streaming) API calls
//!
//! Single prompts and conversation turns that return the whole answer at once.

use tracing::debug;

use super::GeminiClient;
use crate::ai::backend::BackendError;
use crate::ai::format::gemini::{build_request_body, convert_turns, extract_text, prompt_contents};
use crate::ai::types::{ConversationTurn, GenerationOptions};

impl GeminiClient {
    /// Make a simple non-streaming call for a single prompt
    pub(super) async fn call_simple(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let handle = self.model(model);
        let body = build_request_body(prompt_contents(prompt), options, None);

        debug!("Gemini generate: model={}, prompt={} chars", model, prompt.len());
        let json = self.post_json(&handle.generate_url, &body).await?;
        extract_text(&json)
    }

    /// Continue a conversation with one new user message
    pub(super) async fn call_chat(
        &self,
        model: &str,
        history: &[ConversationTurn],
        message: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let handle = self.model(model);
        let turns = ConversationTurn::extended(history, message);
        let body = build_request_body(convert_turns(&turns), options, None);

        debug!(
            "Gemini chat turn: model={}, {} prior turns",
            model,
            history.len()
        );
        let json = self.post_json(&handle.generate_url, &body).await?;
        extract_text(&json)
    }
}
