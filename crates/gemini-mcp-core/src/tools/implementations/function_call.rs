//! gemini_function_call - let the model pick a function to call

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_common, model_schema, options_schema, parse_params};
use crate::ai::types::{FunctionDeclaration, GenerationOptions};
use crate::dispatch::{FailureKind, ToolFailure};
use crate::tools::registry::{ToolContext, ToolHandler};

pub struct GeminiFunctionCallTool;

#[derive(Deserialize)]
struct Params {
    model: String,
    prompt: String,
    functions: Vec<FunctionDeclaration>,
    #[serde(default)]
    options: GenerationOptions,
}

#[async_trait]
impl ToolHandler for GeminiFunctionCallTool {
    fn name(&self) -> &str {
        "gemini_function_call"
    }

    fn description(&self) -> &str {
        "Send a prompt together with function declarations. Returns either \
         {type:'function_call', functionName, functionArgs} when the model wants a \
         function called, or {type:'text', text} when it answers directly."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "model": model_schema(),
                "prompt": {
                    "type": "string",
                    "description": "The prompt to send"
                },
                "functions": {
                    "type": "array",
                    "minItems": 1,
                    "description": "Functions the model may call",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "description": { "type": "string" },
                            "parameters": { "type": "object" }
                        },
                        "required": ["name"]
                    }
                },
                "options": options_schema()
            },
            "required": ["model", "prompt", "functions"]
        })
    }

    fn check(&self, params: &Value) -> Result<(), String> {
        check_common(params)?;
        let mut seen = HashSet::new();
        let names = params
            .get("functions")
            .and_then(|f| f.as_array())
            .into_iter()
            .flatten()
            .filter_map(|f| f.get("name").and_then(|n| n.as_str()));
        for name in names {
            if !seen.insert(name) {
                return Err(format!("functions: duplicate function name '{}'", name));
            }
        }
        Ok(())
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let params: Params = parse_params(self.name(), params)?;
        let outcome = ctx
            .call(|| {
                ctx.backend.invoke_with_functions(
                    &params.model,
                    &params.prompt,
                    &params.functions,
                    &params.options,
                )
            })
            .await?;
        serde_json::to_value(outcome)
            .map_err(|e| ToolFailure::new(FailureKind::BackendRejected, e.to_string()))
    }
}
