//! MCP over stdio
//!
//! Newline-delimited JSON-RPC. Requests are answered one at a time in arrival
//! order. While a tool call runs the reader keeps going: requests queue up
//! behind it, `notifications/cancelled` cancels it, and end of input cancels
//! it and drops whatever is still queued.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::session::{ConnectionSession, TransportKind};
use crate::mcp::{JsonRpcRequest, JsonRpcResponse, McpServer, Routed};

/// Work waiting behind the call in flight
enum Pending {
    Request(JsonRpcRequest),
    /// Parse errors are answered in order like everything else
    Reply(JsonRpcResponse),
}

type InFlight = (Value, BoxFuture<'static, Option<JsonRpcResponse>>);

pub struct StdioTransport {
    server: McpServer,
}

impl StdioTransport {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Serve the process's own stdin/stdout until stdin closes
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run(stdin, tokio::io::stdout()).await
    }

    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = ConnectionSession::new(TransportKind::Stdio);
        let mut lines = reader.lines();
        let mut queue: VecDeque<Pending> = VecDeque::new();
        let mut current: Option<InFlight> = None;
        let mut eof = false;

        info!("stdio transport ready (session {})", session.id());

        loop {
            while current.is_none() {
                let Some(pending) = queue.pop_front() else {
                    break;
                };
                match pending {
                    Pending::Reply(response) => write_frame(&mut writer, &response).await?,
                    Pending::Request(request) => {
                        current = self.start(&mut session, request, &mut writer).await?;
                    }
                }
            }

            if eof && current.is_none() {
                break;
            }

            tokio::select! {
                line = lines.next_line(), if !eof => {
                    match line.context("Failed to read from stdin")? {
                        Some(line) => self.accept(&line, &mut session, &mut queue),
                        None => {
                            debug!("stdin closed");
                            eof = true;
                            if !queue.is_empty() {
                                warn!("Dropping {} queued requests at end of input", queue.len());
                                queue.clear();
                            }
                            if let Some((id, _)) = &current {
                                session.cancel_call(id);
                            }
                        }
                    }
                }
                response = next_response(&mut current), if current.is_some() => {
                    if let Some((id, _)) = current.take() {
                        session.finish_call(&id);
                    }
                    if let Some(response) = response {
                        write_frame(&mut writer, &response).await?;
                    }
                }
            }
        }

        session.close();
        info!("stdio transport finished");
        Ok(())
    }

    /// Decode one line; notifications act immediately, everything else queues
    fn accept(&self, line: &str, session: &mut ConnectionSession, queue: &mut VecDeque<Pending>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        debug!("stdin frame: {} bytes", line.len());

        let request = match McpServer::decode(line) {
            Ok(request) => request,
            Err(response) => {
                queue.push_back(Pending::Reply(response));
                return;
            }
        };

        if !request.is_notification() {
            queue.push_back(Pending::Request(request));
            return;
        }

        match self.server.route(session, request) {
            Routed::Cancel { request_id } => {
                if session.cancel_call(&request_id) {
                    return;
                }
                let queued = queue.len();
                queue.retain(|pending| match pending {
                    Pending::Request(request) => request.id.as_ref() != Some(&request_id),
                    Pending::Reply(_) => true,
                });
                if queue.len() < queued {
                    debug!("Dropped queued request {} before it started", request_id);
                } else {
                    debug!("Cancellation for {} matched nothing", request_id);
                }
            }
            Routed::Reply(response) => queue.push_back(Pending::Reply(response)),
            Routed::NoReply | Routed::Call { .. } => {}
        }
    }

    /// Route a dequeued request; returns the call to wait on, if it started one
    async fn start<W: AsyncWrite + Unpin>(
        &self,
        session: &mut ConnectionSession,
        request: JsonRpcRequest,
        writer: &mut W,
    ) -> Result<Option<InFlight>> {
        match self.server.route(session, request) {
            Routed::Reply(response) => {
                write_frame(writer, &response).await?;
                Ok(None)
            }
            Routed::NoReply => Ok(None),
            Routed::Cancel { request_id } => {
                session.cancel_call(&request_id);
                Ok(None)
            }
            Routed::Call { id, request } => {
                let cancel = session.begin_call(&id);
                let server = self.server.clone();
                let call_id = id.clone();
                let call = async move { server.call_tool(call_id, request, cancel).await }.boxed();
                Ok(Some((id, call)))
            }
        }
    }
}

async fn next_response(current: &mut Option<InFlight>) -> Option<JsonRpcResponse> {
    match current {
        Some((_, call)) => call.await,
        None => std::future::pending().await,
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let mut frame = serde_json::to_string(response).context("Failed to encode response")?;
    frame.push('\n');
    writer
        .write_all(frame.as_bytes())
        .await
        .context("Failed to write to stdout")?;
    writer.flush().await.context("Failed to flush stdout")?;
    Ok(())
}
