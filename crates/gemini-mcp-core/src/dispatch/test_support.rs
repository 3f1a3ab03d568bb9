//! Scriptable backend double shared by the dispatcher and transport tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::Dispatcher;
use crate::ai::backend::{BackendError, GenerativeBackend, TextStream};
use crate::ai::retry::RetryConfig;
use crate::ai::types::{ConversationTurn, FunctionDeclaration, FunctionOutcome, GenerationOptions};
use crate::tools::ToolCatalog;

/// Counts calls, fails the first few with scripted errors, then answers `reply`
pub(crate) struct StubBackend {
    calls: AtomicUsize,
    /// Calls dropped before their answer was ready
    abandoned: AtomicUsize,
    failures: Mutex<VecDeque<BackendError>>,
    reply: String,
    chunks: Vec<Result<String, BackendError>>,
    /// Delay before each answer, to keep a call in flight
    latency: Duration,
    histories: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            abandoned: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            reply: reply.to_string(),
            chunks: vec![Ok(reply.to_string())],
            latency: Duration::ZERO,
            histories: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(mut self, failures: Vec<BackendError>) -> Self {
        self.failures = Mutex::new(failures.into());
        self
    }

    pub fn with_chunks(mut self, chunks: Vec<Result<String, BackendError>>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Histories received by `chat_turn`, in call order
    pub fn histories(&self) -> Vec<Vec<ConversationTurn>> {
        self.histories.lock().unwrap().clone()
    }

    async fn answer(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = AbandonGuard {
            counter: &self.abandoned,
            armed: true,
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard.disarm();
        match self.failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Counts a call as abandoned if its future is dropped mid-flight
struct AbandonGuard<'a> {
    counter: &'a AtomicUsize,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Poll until `condition` holds, failing the test after five seconds
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[async_trait]
impl GenerativeBackend for StubBackend {
    async fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        self.answer().await?;
        Ok(self.reply.clone())
    }

    async fn generate_stream(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<TextStream, BackendError> {
        self.answer().await?;
        Ok(stream::iter(self.chunks.clone()).boxed())
    }

    async fn chat_turn(
        &self,
        _model: &str,
        history: &[ConversationTurn],
        message: &str,
        _options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        self.histories
            .lock()
            .unwrap()
            .push(ConversationTurn::extended(history, message));
        self.answer().await?;
        Ok(self.reply.clone())
    }

    async fn invoke_with_functions(
        &self,
        _model: &str,
        _prompt: &str,
        _functions: &[FunctionDeclaration],
        _options: &GenerationOptions,
    ) -> Result<FunctionOutcome, BackendError> {
        self.answer().await?;
        Ok(FunctionOutcome::Text {
            text: self.reply.clone(),
        })
    }
}

/// Built-in catalog over `backend`, retrying with millisecond delays
pub(crate) fn dispatcher_over(backend: Arc<StubBackend>) -> Dispatcher {
    let retry = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    };
    Dispatcher::new(Arc::new(ToolCatalog::builtin().unwrap()), backend, retry)
}
