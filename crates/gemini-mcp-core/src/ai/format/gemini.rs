//! Gemini API format handler
//!
//! Converts the canonical conversation and option types into the
//! `generateContent` request shape, and pulls text or function calls back out
//! of responses. The `{role, parts:[{text}]}` form never leaves this module.

use serde_json::{json, Value};
use tracing::debug;

use crate::ai::backend::BackendError;
use crate::ai::types::{ConversationTurn, FunctionDeclaration, FunctionOutcome, GenerationOptions};

/// Convert canonical turns to Gemini `contents`
pub fn convert_turns(turns: &[ConversationTurn]) -> Vec<Value> {
    turns
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role.as_str(),
                "parts": [{ "text": turn.content }]
            })
        })
        .collect()
}

/// `contents` for a single user prompt
pub fn prompt_contents(prompt: &str) -> Vec<Value> {
    convert_turns(&[ConversationTurn::user(prompt)])
}

/// Build a `generateContent` / `streamGenerateContent` body
pub fn build_request_body(
    contents: Vec<Value>,
    options: &GenerationOptions,
    functions: Option<&[FunctionDeclaration]>,
) -> Value {
    let mut body = json!({ "contents": contents });

    if !options.is_empty() {
        // Field names already match Gemini's generationConfig
        body["generationConfig"] = serde_json::to_value(options).unwrap_or_else(|_| json!({}));
    }

    if let Some(functions) = functions.filter(|f| !f.is_empty()) {
        let declarations: Vec<Value> = functions
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "description": f.description,
                    "parameters": f.parameters
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

/// Parts of the first candidate, or a decode error explaining why there are none
fn first_candidate_parts(json: &Value) -> Result<&Vec<Value>, BackendError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());

    let Some(candidate) = candidate else {
        let reason = json
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates");
        return Err(BackendError::decode(format!(
            "response contained no candidates ({})",
            reason
        )));
    };

    match candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array())
    {
        Some(parts) => Ok(parts),
        None => {
            let finish = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            Err(BackendError::decode(format!(
                "candidate has no content (finishReason: {})",
                finish
            )))
        }
    }
}

fn join_text_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect()
}

/// Extract the answer text from a full response
pub fn extract_text(json: &Value) -> Result<String, BackendError> {
    let parts = first_candidate_parts(json)?;
    Ok(join_text_parts(parts).trim().to_string())
}

/// Extract a function call if the model made one, else the answer text
pub fn extract_function_outcome(json: &Value) -> Result<FunctionOutcome, BackendError> {
    let parts = first_candidate_parts(json)?;

    if let Some(call) = parts.iter().find_map(|part| part.get("functionCall")) {
        let function_name = call
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| BackendError::decode("functionCall without a name"))?
            .to_string();
        let function_args = call.get("args").cloned().unwrap_or_else(|| json!({}));
        debug!("Model requested function call: {}", function_name);
        return Ok(FunctionOutcome::FunctionCall {
            function_name,
            function_args,
        });
    }

    Ok(FunctionOutcome::Text {
        text: join_text_parts(parts).trim().to_string(),
    })
}

/// Text carried by one streamed chunk
///
/// Chunks without candidates (usage-only trailers) and final chunks that only
/// carry a normal finishReason yield an empty string. A blocked prompt, a
/// candidate stopped for any other reason, or an `error` object fails the
/// stream the same way the unary path would.
pub fn extract_chunk_text(json: &Value) -> Result<String, BackendError> {
    if let Some(error) = json.get("error") {
        return Err(error_from_body(error, 500));
    }
    if json.get("candidates").is_none() {
        return match block_reason(json) {
            Some(reason) => Err(BackendError::decode(format!(
                "response contained no candidates ({})",
                reason
            ))),
            None => Ok(String::new()),
        };
    }
    match first_candidate_parts(json) {
        Ok(parts) => Ok(join_text_parts(parts)),
        Err(e) => match finish_reason(json) {
            None | Some("STOP") | Some("MAX_TOKENS") => Ok(String::new()),
            Some(_) => Err(e),
        },
    }
}

fn block_reason(json: &Value) -> Option<&str> {
    json.get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
}

fn finish_reason(json: &Value) -> Option<&str> {
    json.get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|candidate| candidate.get("finishReason"))
        .and_then(|r| r.as_str())
}

/// Build an HTTP error from a Gemini `error` object, falling back to `default_status`
pub fn error_from_body(error: &Value, default_status: u16) -> BackendError {
    let status = error
        .get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(default_status);
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    BackendError::http(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_turns_uses_parts() {
        let turns = vec![ConversationTurn::user("hi"), ConversationTurn::model("hello")];
        let contents = convert_turns(&turns);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "hi");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn test_body_without_options_has_no_generation_config() {
        let body = build_request_body(prompt_contents("2+2"), &GenerationOptions::default(), None);
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("tools").is_none());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "2+2");
    }

    #[test]
    fn test_body_with_options_and_functions() {
        let options = GenerationOptions {
            temperature: Some(0.3),
            max_output_tokens: Some(64),
            ..Default::default()
        };
        let functions = vec![FunctionDeclaration {
            name: "get_weather".to_string(),
            description: "Current weather".to_string(),
            parameters: json!({ "type": "object", "properties": { "city": { "type": "string" } } }),
        }];
        let body = build_request_body(prompt_contents("weather?"), &options, Some(&functions));

        assert_eq!(body["generationConfig"]["temperature"], 0.3);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
        assert!(body["generationConfig"].get("topK").is_none());
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "get_weather"
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "4" }, { "text": "\n" }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_text(&response).unwrap(), "4");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let response = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_text(&response).unwrap_err();
        assert!(matches!(err, BackendError::Decode { .. }));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_function_call() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{
                    "functionCall": { "name": "get_weather", "args": { "city": "Oslo" } }
                }] }
            }]
        });
        match extract_function_outcome(&response).unwrap() {
            FunctionOutcome::FunctionCall {
                function_name,
                function_args,
            } => {
                assert_eq!(function_name, "get_weather");
                assert_eq!(function_args["city"], "Oslo");
            }
            other => panic!("expected function call, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_function_outcome_falls_back_to_text() {
        let response = json!({ "candidates": [{ "content": { "parts": [{ "text": "no call" }] } }] });
        assert_eq!(
            extract_function_outcome(&response).unwrap(),
            FunctionOutcome::Text {
                text: "no call".to_string()
            }
        );
    }

    #[test]
    fn test_chunk_text_and_errors() {
        let chunk = json!({ "candidates": [{ "content": { "parts": [{ "text": "Hel" }] } }] });
        assert_eq!(extract_chunk_text(&chunk).unwrap(), "Hel");

        let usage_only = json!({ "usageMetadata": { "totalTokenCount": 3 } });
        assert_eq!(extract_chunk_text(&usage_only).unwrap(), "");

        let finished = json!({ "candidates": [{ "finishReason": "STOP" }] });
        assert_eq!(extract_chunk_text(&finished).unwrap(), "");

        let error = json!({ "error": { "code": 503, "message": "overloaded" } });
        assert_eq!(
            extract_chunk_text(&error).unwrap_err(),
            BackendError::http(503, "overloaded")
        );
    }

    #[test]
    fn test_blocked_chunks_fail_like_unary() {
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_chunk_text(&blocked).unwrap_err();
        assert!(matches!(err, BackendError::Decode { .. }));
        assert_eq!(err, extract_text(&blocked).unwrap_err());

        let stopped = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        let err = extract_chunk_text(&stopped).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
        assert_eq!(err, extract_text(&stopped).unwrap_err());
    }
}
