//! stream_gemini - answer delivered incrementally
//!
//! Opening the stream goes through the retry policy; once chunks are flowing a
//! failure ends the stream instead of restarting it.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_common, model_schema, options_schema, parse_params};
use crate::ai::backend::TextStream;
use crate::ai::types::GenerationOptions;
use crate::dispatch::ToolFailure;
use crate::tools::registry::{ToolContext, ToolHandler};

pub struct StreamGeminiTool;

#[derive(Deserialize)]
struct Params {
    model: String,
    query: String,
    #[serde(default)]
    options: GenerationOptions,
}

impl StreamGeminiTool {
    async fn open(&self, params: Value, ctx: &ToolContext) -> Result<TextStream, ToolFailure> {
        let params: Params = parse_params(self.name(), params)?;
        ctx.call(|| {
            ctx.backend
                .generate_stream(&params.model, &params.query, &params.options)
        })
        .await
    }
}

#[async_trait]
impl ToolHandler for StreamGeminiTool {
    fn name(&self) -> &str {
        "stream_gemini"
    }

    fn description(&self) -> &str {
        "Ask a Gemini model a question and stream the answer as it is generated. \
         Called without a streaming transport, returns the concatenated answer."
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
        let mut chunks = self.open(params, ctx).await?;
        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(ToolFailure::cancelled()),
                next = chunks.next() => next,
            };
            match next {
                Some(Ok(chunk)) => text.push_str(&chunk),
                Some(Err(e)) => return Err(ToolFailure::from_backend(&e)),
                None => break,
            }
        }
        Ok(Value::String(text))
    }

    async fn open_stream(
        &self,
        params: Value,
        ctx: &ToolContext,
    ) -> Option<Result<TextStream, ToolFailure>> {
        Some(self.open(params, ctx).await)
    }
}
