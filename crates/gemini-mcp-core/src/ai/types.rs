//! Domain types shared by the backend facade and the tools

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One entry of a caller-supplied conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }

    /// Copy of `history` with one new user turn appended.
    ///
    /// The caller's history is left untouched.
    pub fn extended(history: &[ConversationTurn], message: &str) -> Vec<ConversationTurn> {
        let mut turns = Vec::with_capacity(history.len() + 1);
        turns.extend_from_slice(history);
        turns.push(ConversationTurn::user(message));
        turns
    }
}

/// Generation knobs recognised by the backend
///
/// Every field is optional; unset fields are left to the backend's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl GenerationOptions {
    /// Check value ranges, returning the first violation
    pub fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(format!(
                    "options.temperature must be between 0 and 1, got {}",
                    t
                ));
            }
        }
        if self.max_output_tokens == Some(0) {
            return Err("options.maxOutputTokens must be at least 1".to_string());
        }
        if self.top_k == Some(0) {
            return Err("options.topK must be at least 1".to_string());
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("options.topP must be between 0 and 1, got {}", p));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A function the model may elect to call instead of answering in text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Result of a call made with function declarations attached
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunctionOutcome {
    /// The model answered in plain text
    Text { text: String },
    /// The model asked for a function to be called
    FunctionCall {
        #[serde(rename = "functionName")]
        function_name: String,
        #[serde(rename = "functionArgs")]
        function_args: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_does_not_mutate_history() {
        let history = vec![ConversationTurn::user("hi"), ConversationTurn::model("hello")];
        let extended = ConversationTurn::extended(&history, "bye");

        assert_eq!(history.len(), 2);
        assert_eq!(extended.len(), 3);
        assert_eq!(extended[2], ConversationTurn::user("bye"));
        assert_eq!(&extended[..2], &history[..]);
    }

    #[test]
    fn test_options_wire_names() {
        let options: GenerationOptions = serde_json::from_value(serde_json::json!({
            "temperature": 0.2,
            "maxOutputTokens": 128,
            "topK": 40,
            "topP": 0.9
        }))
        .unwrap();
        assert_eq!(options.max_output_tokens, Some(128));
        assert_eq!(options.top_k, Some(40));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_reject_unknown_field() {
        let result: Result<GenerationOptions, _> =
            serde_json::from_value(serde_json::json!({ "temprature": 0.2 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_options_range_checks() {
        let hot = GenerationOptions {
            temperature: Some(1.5),
            ..Default::default()
        };
        assert!(hot.validate().unwrap_err().contains("temperature"));

        let zero_tokens = GenerationOptions {
            max_output_tokens: Some(0),
            ..Default::default()
        };
        assert!(zero_tokens.validate().unwrap_err().contains("maxOutputTokens"));

        let bad_top_p = GenerationOptions {
            top_p: Some(-0.1),
            ..Default::default()
        };
        assert!(bad_top_p.validate().unwrap_err().contains("topP"));
    }

    #[test]
    fn test_function_outcome_serialization() {
        let call = FunctionOutcome::FunctionCall {
            function_name: "get_weather".to_string(),
            function_args: serde_json::json!({ "city": "Paris" }),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["type"], "function_call");
        assert_eq!(json["functionName"], "get_weather");
        assert_eq!(json["functionArgs"]["city"], "Paris");
    }
}
