//! Function-calling API calls
//!
//! The model either answers in text or returns a structured call request.

use tracing::info;

use super::GeminiClient;
use crate::ai::backend::BackendError;
use crate::ai::format::gemini::{build_request_body, extract_function_outcome, prompt_contents};
use crate::ai::types::{FunctionDeclaration, FunctionOutcome, GenerationOptions};

impl GeminiClient {
    /// Call the API with function declarations attached (non-streaming)
    pub(super) async fn call_with_functions(
        &self,
        model: &str,
        prompt: &str,
        functions: &[FunctionDeclaration],
        options: &GenerationOptions,
    ) -> Result<FunctionOutcome, BackendError> {
        let handle = self.model(model);
        let body = build_request_body(prompt_contents(prompt), options, Some(functions));

        info!(
            "Calling Gemini with {} function declarations (model: {})",
            functions.len(),
            model
        );
        let json = self.post_json(&handle.generate_url, &body).await?;
        extract_function_outcome(&json)
    }
}
