//! ask_gemini - single question, full answer

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_common, model_schema, options_schema, parse_params};
use crate::ai::types::GenerationOptions;
use crate::dispatch::ToolFailure;
use crate::tools::registry::{ToolContext, ToolHandler};

pub struct AskGeminiTool;

#[derive(Deserialize)]
struct Params {
    model: String,
    query: String,
    #[serde(default)]
    options: GenerationOptions,
}

#[async_trait]
impl ToolHandler for AskGeminiTool {
    fn name(&self) -> &str {
        "ask_gemini"
    }

    fn description(&self) -> &str {
        "Ask a Gemini model a single question and return its full answer as text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "model": model_schema(),
                "query": {
                    "type": "string",
                    "description": "The question or prompt to send"
                },
                "options": options_schema()
            },
            "required": ["model", "query"]
        })
    }

    fn check(&self, params: &Value) -> Result<(), String> {
        check_common(params)
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let params: Params = parse_params(self.name(), params)?;
        let text = ctx
            .call(|| {
                ctx.backend
                    .generate(&params.model, &params.query, &params.options)
            })
            .await?;
        Ok(Value::String(text))
    }
}
