//! chat_with_gemini - continue a caller-supplied conversation
//!
//! The history travels with every request; nothing is kept between calls.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_common, model_schema, options_schema, parse_params};
use crate::ai::types::{ConversationTurn, GenerationOptions};
use crate::dispatch::ToolFailure;
use crate::tools::registry::{ToolContext, ToolHandler};

pub struct ChatWithGeminiTool;

#[derive(Deserialize)]
struct Params {
    model: String,
    conversation: Vec<ConversationTurn>,
    message: String,
    #[serde(default)]
    options: GenerationOptions,
}

#[async_trait]
impl ToolHandler for ChatWithGeminiTool {
    fn name(&self) -> &str {
        "chat_with_gemini"
    }

    fn description(&self) -> &str {
        "Continue a conversation with a Gemini model. Pass the prior turns in \
         'conversation' and the new user message in 'message'; returns the model's reply."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "model": model_schema(),
                "conversation": {
                    "type": "array",
                    "description": "Prior turns, oldest first",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": { "type": "string", "enum": ["user", "model"] },
                            "content": { "type": "string" }
                        },
                        "required": ["role", "content"]
                    }
                },
                "message": {
                    "type": "string",
                    "description": "The new user message"
                },
                "options": options_schema()
            },
            "required": ["model", "conversation", "message"]
        })
    }

    fn check(&self, params: &Value) -> Result<(), String> {
        check_common(params)
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let params: Params = parse_params(self.name(), params)?;
        let reply = ctx
            .call(|| {
                ctx.backend.chat_turn(
                    &params.model,
                    &params.conversation,
                    &params.message,
                    &params.options,
                )
            })
            .await?;
        Ok(Value::String(reply))
    }
}
