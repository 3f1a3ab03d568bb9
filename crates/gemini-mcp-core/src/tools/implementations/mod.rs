//! Built-in Gemini tools

mod ask;
mod chat;
mod function_call;
mod stream;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

pub use ask::AskGeminiTool;
pub use chat::ChatWithGeminiTool;
pub use function_call::GeminiFunctionCallTool;
pub use stream::StreamGeminiTool;

use crate::ai::types::GenerationOptions;
use crate::dispatch::ToolFailure;
use crate::tools::registry::ToolHandler;

/// The default tool set, in advertised order
pub fn builtin_tools() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(AskGeminiTool),
        Arc::new(ChatWithGeminiTool),
        Arc::new(StreamGeminiTool),
        Arc::new(GeminiFunctionCallTool),
    ]
}

/// Deserialize already-validated parameters into a tool's params struct
pub(crate) fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolFailure> {
    serde_json::from_value(params).map_err(|e| {
        warn!("{}: invalid parameters: {}", tool, e);
        ToolFailure::invalid_parameters(format!("Invalid parameters: {}", e))
    })
}

pub(crate) fn model_schema() -> Value {
    json!({
        "type": "string",
        "minLength": 1,
        "description": "Gemini model id, e.g. 'gemini-2.0-flash'"
    })
}

pub(crate) fn options_schema() -> Value {
    json!({
        "type": "object",
        "description": "Generation options; unset fields use the model defaults",
        "properties": {
            "temperature": { "type": "number", "minimum": 0, "maximum": 1 },
            "maxOutputTokens": { "type": "integer", "minimum": 1 },
            "topK": { "type": "integer", "minimum": 1 },
            "topP": { "type": "number", "minimum": 0, "maximum": 1 }
        },
        "additionalProperties": false
    })
}

/// Model ids are `[A-Za-z0-9._-]+`, optionally prefixed with `models/`
fn check_model(params: &Value) -> Result<(), String> {
    let Some(model) = params.get("model").and_then(|m| m.as_str()) else {
        return Ok(());
    };
    let id = model.strip_prefix("models/").unwrap_or(model);
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(format!("model: invalid model id '{}'", model))
    }
}

fn check_options(params: &Value) -> Result<(), String> {
    let Some(raw) = params.get("options") else {
        return Ok(());
    };
    let options: GenerationOptions =
        serde_json::from_value(raw.clone()).map_err(|e| format!("options: {}", e))?;
    options.validate()
}

/// Checks shared by every built-in tool
pub(crate) fn check_common(params: &Value) -> Result<(), String> {
    check_model(params)?;
    check_options(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        assert!(check_model(&json!({ "model": "gemini-2.0-flash" })).is_ok());
        assert!(check_model(&json!({ "model": "models/gemini-1.5-pro_001" })).is_ok());
        assert!(check_model(&json!({ "model": "../etc" })).is_err());
        assert!(check_model(&json!({ "model": "models/" })).is_err());
        assert!(check_model(&json!({ "model": "a b" })).is_err());
    }

    #[test]
    fn test_options_checked() {
        assert!(check_common(&json!({ "model": "m", "options": { "topP": 0.9 } })).is_ok());
        let err = check_common(&json!({ "model": "m", "options": { "topP": 2.0 } })).unwrap_err();
        assert!(err.contains("topP"));
    }

    #[test]
    fn test_builtin_names_unique() {
        let tools = builtin_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }
}
