//! Request dispatcher
//!
//! Every transport funnels invocations through [`Dispatcher`]. A request moves
//! `Received -> Validated -> InFlight (retrying inside the resilience wrapper)
//! -> Completed | Failed`, and yields exactly one terminal result.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::result::{payload_text, InvocationRequest, InvocationResult, StreamEvent, ToolFailure};
use crate::ai::backend::{GenerativeBackend, TextStream};
use crate::ai::retry::RetryConfig;
use crate::tools::schema;
use crate::tools::{ToolCatalog, ToolContext, ToolHandler};

/// Validates and routes invocations to tool handlers
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<ToolCatalog>,
    backend: Arc<dyn GenerativeBackend>,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        backend: Arc<dyn GenerativeBackend>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            catalog,
            backend,
            retry,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    fn context(&self, cancel: CancellationToken) -> ToolContext {
        ToolContext {
            backend: self.backend.clone(),
            retry: self.retry,
            cancel,
        }
    }

    /// Lookup plus parameter checks; nothing here touches the backend
    pub fn validate(&self, request: &InvocationRequest) -> Result<Arc<dyn ToolHandler>, ToolFailure> {
        let tool = self
            .catalog
            .lookup(&request.tool_name)
            .ok_or_else(|| ToolFailure::unknown_tool(&request.tool_name))?;

        if !request.parameters.is_object() {
            return Err(ToolFailure::invalid_parameters(
                "Parameters must be a JSON object",
            ));
        }

        schema::validate(&tool.parameter_schema, &request.parameters)
            .map_err(|v| ToolFailure::invalid_parameters(v.to_string()))?;

        tool.handler
            .check(&request.parameters)
            .map_err(ToolFailure::invalid_parameters)?;

        Ok(tool.handler.clone())
    }

    /// Run one invocation to completion
    pub async fn handle(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> InvocationResult {
        let started = Instant::now();
        debug!("Received {} (id: {})", request.tool_name, request.id);

        let handler = match self.validate(&request) {
            Ok(handler) => handler,
            Err(failure) => {
                warn!("Rejected {} (id: {}): {}", request.tool_name, request.id, failure);
                return InvocationResult::Failure(failure);
            }
        };

        let InvocationRequest {
            id,
            tool_name,
            parameters,
        } = request;
        debug!("Validated {} (id: {}), calling backend", tool_name, id);

        let ctx = self.context(cancel);
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ToolFailure::cancelled()),
            outcome = handler.invoke(parameters, &ctx) => outcome,
        };

        match &outcome {
            Ok(_) => info!(
                "Completed {} (id: {}) in {:?}",
                tool_name,
                id,
                started.elapsed()
            ),
            Err(failure) => warn!(
                "Failed {} (id: {}) after {:?}: {}",
                tool_name,
                id,
                started.elapsed(),
                failure
            ),
        }

        outcome.into()
    }

    /// Run one invocation as a stream of events
    ///
    /// Chunks arrive in production order and the stream ends with exactly one
    /// `Done` or `Failed`. Tools without a streaming form emit their unary
    /// payload as a single chunk. Dropping the stream abandons the call.
    pub fn handle_stream(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        debug!("Received stream {} (id: {})", request.tool_name, request.id);

        let handler = match self.validate(&request) {
            Ok(handler) => handler,
            Err(failure) => {
                warn!("Rejected stream {} (id: {}): {}", request.tool_name, request.id, failure);
                return stream::once(async move { StreamEvent::Failed(failure) }).boxed();
            }
        };

        let call = StreamCall {
            id: request.id,
            tool: request.tool_name,
            ctx: self.context(cancel),
            chunks_sent: 0,
            started: Instant::now(),
        };
        let phase = Phase::Opening {
            call,
            handler,
            params: request.parameters,
        };

        stream::unfold(phase, |phase| async move { phase.advance().await }).boxed()
    }
}

/// Bookkeeping for one streamed call
struct StreamCall {
    id: Value,
    tool: String,
    ctx: ToolContext,
    chunks_sent: usize,
    started: Instant,
}

impl StreamCall {
    fn fail(self, failure: ToolFailure) -> Option<(StreamEvent, Phase)> {
        warn!(
            "Stream {} (id: {}) failed after {} chunks: {}",
            self.tool, self.id, self.chunks_sent, failure
        );
        Some((StreamEvent::Failed(failure), Phase::Finished))
    }

    fn done(self) -> Option<(StreamEvent, Phase)> {
        info!(
            "Stream {} (id: {}) completed: {} chunks in {:?}",
            self.tool,
            self.id,
            self.chunks_sent,
            self.started.elapsed()
        );
        Some((StreamEvent::Done, Phase::Finished))
    }
}

enum Phase {
    Opening {
        call: StreamCall,
        handler: Arc<dyn ToolHandler>,
        params: Value,
    },
    Streaming {
        call: StreamCall,
        chunks: TextStream,
    },
    /// Unary fallback delivered its chunk; only `Done` remains
    Closing {
        call: StreamCall,
    },
    Finished,
}

impl Phase {
    async fn advance(self) -> Option<(StreamEvent, Phase)> {
        let mut phase = self;
        loop {
            phase = match phase {
                Phase::Finished => return None,
                Phase::Closing { call } => return call.done(),
                Phase::Opening {
                    call,
                    handler,
                    params,
                } => {
                    let opened = tokio::select! {
                        biased;
                        _ = call.ctx.cancel.cancelled() => Some(Err(ToolFailure::cancelled())),
                        opened = handler.open_stream(params.clone(), &call.ctx) => opened,
                    };
                    match opened {
                        Some(Ok(chunks)) => {
                            debug!("Stream {} (id: {}) open", call.tool, call.id);
                            Phase::Streaming { call, chunks }
                        }
                        Some(Err(failure)) => return call.fail(failure),
                        None => return Self::unary(call, handler, params).await,
                    }
                }
                Phase::Streaming { mut call, mut chunks } => {
                    let next = tokio::select! {
                        biased;
                        _ = call.ctx.cancel.cancelled() => return call.fail(ToolFailure::cancelled()),
                        next = chunks.next() => next,
                    };
                    return match next {
                        Some(Ok(text)) => {
                            call.chunks_sent += 1;
                            debug!("Stream {} (id: {}) chunk {}", call.tool, call.id, call.chunks_sent);
                            Some((StreamEvent::Chunk(text), Phase::Streaming { call, chunks }))
                        }
                        Some(Err(e)) => call.fail(ToolFailure::from_backend(&e)),
                        None => call.done(),
                    };
                }
            };
        }
    }

    /// Run a tool without a streaming form and emit its payload as one chunk
    async fn unary(
        mut call: StreamCall,
        handler: Arc<dyn ToolHandler>,
        params: Value,
    ) -> Option<(StreamEvent, Phase)> {
        let outcome = tokio::select! {
            biased;
            _ = call.ctx.cancel.cancelled() => Err(ToolFailure::cancelled()),
            outcome = handler.invoke(params, &call.ctx) => outcome,
        };
        match outcome {
            Ok(payload) => {
                call.chunks_sent = 1;
                Some((
                    StreamEvent::Chunk(payload_text(&payload)),
                    Phase::Closing { call },
                ))
            }
            Err(failure) => call.fail(failure),
        }
    }
}
