//! Streaming API calls
//!
//! Opens `streamGenerateContent?alt=sse` and turns the SSE body into a lazy
//! stream of text chunks. Dropping the stream drops the HTTP response.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

use super::GeminiClient;
use crate::ai::backend::{BackendError, TextStream};
use crate::ai::format::gemini::{build_request_body, extract_chunk_text, prompt_contents};
use crate::ai::sse::{SseDecoder, DONE_MARKER};
use crate::ai::types::GenerationOptions;

/// State threaded through the chunk stream
struct ChunkState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, BackendError>>,
    finished: bool,
}

impl ChunkState {
    /// Queue the text (or error) carried by one SSE data payload
    fn accept(&mut self, data: &str) {
        if data == DONE_MARKER {
            return;
        }
        let parsed = serde_json::from_str::<Value>(data)
            .map_err(|e| BackendError::decode(format!("Invalid stream chunk: {}", e)))
            .and_then(|json| extract_chunk_text(&json));

        match parsed {
            Ok(text) if text.is_empty() => {}
            Ok(text) => self.pending.push_back(Ok(text)),
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

impl GeminiClient {
    /// Open a streaming generation for a single prompt
    pub(super) async fn call_streaming(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream, BackendError> {
        let handle = self.model(model);
        let body = build_request_body(prompt_contents(prompt), options, None);

        info!("Opening Gemini stream: model={}", model);
        let response = self.send(&handle.stream_url, &body).await?;

        let state = ChunkState {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let chunks = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        for data in state.decoder.push(&bytes) {
                            if state.finished {
                                break;
                            }
                            state.accept(&data);
                        }
                    }
                    Some(Err(e)) => {
                        debug!("Gemini stream broke: {}", e);
                        state.pending.push_back(Err(BackendError::network(format!(
                            "Stream interrupted: {}",
                            e
                        ))));
                        state.finished = true;
                    }
                    None => {
                        if let Some(data) = state.decoder.finish() {
                            state.accept(&data);
                        }
                        state.finished = true;
                    }
                }
            }
        });

        Ok(Box::pin(chunks))
    }
}
