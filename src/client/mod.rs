//! Client side of the relay: issues the streaming chat request, reassembles
//! delta fragments into a full assistant reply, and drives image-task
//! polling.

pub mod task;

use crate::error::{ RelayError, Result };
use crate::models::chat::{ ChatMessage, ChatRequest, ErrorRecord, StreamChunk };
use crate::sse::{ self, LineFramer };
use futures::Stream;
use futures::StreamExt;
use log::warn;
use reqwest::Client as HttpClient;
use std::fmt;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use tokio::sync::Notify;

/// Cancellation handle scoped to one in-flight operation. Created by the
/// caller, handed to the operation, cancelled on teardown or explicit user
/// action. Once cancelled the operation drops its stream handle and never
/// reads from it again.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a waiter registering after this
        // call still wakes immediately.
        self.inner.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}

/// Per-request lifecycle of a chat exchange. `Finalized` and `Errored` are
/// resting states: the next `send` call leaves them the same way `Idle` is
/// left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Finalized,
    Errored,
}

/// One conversation against the relay's chat endpoint. Holds the full
/// message history and replays it on every request; a single request is in
/// flight at a time.
pub struct ChatSession {
    http: HttpClient,
    endpoint: String,
    messages: Vec<ChatMessage>,
    state: SessionState,
}

impl ChatSession {
    /// `endpoint` is the full URL of the relay chat route, e.g.
    /// `http://127.0.0.1:7777/api/chat`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.into(),
            messages: Vec::new(),
            state: SessionState::Idle,
        }
    }

    /// Starts the conversation with a leading system message.
    pub fn with_system(endpoint: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let mut session = Self::new(endpoint);
        session.messages.push(ChatMessage::system(system_prompt));
        session
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sends a user message and streams the assistant reply to completion.
    ///
    /// `on_partial` receives the accumulated text after every delta, for
    /// progressive rendering. On success the reply is appended to the
    /// conversation and returned. On any failure the user message stays in
    /// the conversation but no assistant reply is appended, and there is no
    /// automatic retry.
    pub async fn send<F>(
        &mut self,
        content: impl Into<String>,
        cancel: &CancelHandle,
        mut on_partial: F
    ) -> Result<ChatMessage>
        where F: FnMut(&str)
    {
        self.messages.push(ChatMessage::user(content));
        self.state = SessionState::Streaming;

        let request = ChatRequest { messages: self.messages.clone() };
        match self.stream_reply(&request, cancel, &mut on_partial).await {
            Ok(content) => {
                let reply = ChatMessage::assistant(content);
                self.messages.push(reply.clone());
                self.state = SessionState::Finalized;
                Ok(reply)
            }
            Err(e) => {
                self.state = SessionState::Errored;
                Err(e)
            }
        }
    }

    async fn stream_reply<F>(
        &self,
        request: &ChatRequest,
        cancel: &CancelHandle,
        on_partial: &mut F
    ) -> Result<String>
        where F: FnMut(&str)
    {
        let resp = self.http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        if resp.error_for_status_ref().is_err() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Status { status, body });
        }

        consume_event_stream(resp.bytes_stream(), cancel, on_partial).await
    }
}

/// Reads a text event stream to completion, accumulating delta content.
///
/// Each complete `data:` line is handled exactly once, regardless of how the
/// transport chunked it:
/// - the `[DONE]` sentinel finalizes and returns the accumulation;
/// - a chunk envelope contributes its first choice's delta (empty when
///   absent) and triggers `on_partial` with the updated accumulation;
/// - a relay error record fails the stream with the relayed message;
/// - anything else is logged and skipped, leaving the stream healthy.
///
/// The transport ending without the sentinel is an error, never a silent
/// success.
pub async fn consume_event_stream<S, B, E, F>(
    stream: S,
    cancel: &CancelHandle,
    on_partial: &mut F
) -> Result<String>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
        F: FnMut(&str)
{
    tokio::pin!(stream);
    let mut framer = LineFramer::new();
    let mut accumulated = String::new();

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RelayError::Cancelled);
            }
            item = stream.next() => item,
        };
        let Some(chunk) = item else {
            break;
        };
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(RelayError::Transport(e.to_string()));
            }
        };

        for line in framer.push(bytes.as_ref()) {
            let Some(payload) = sse::data_payload(&line) else {
                continue;
            };
            if payload == sse::DONE_SENTINEL {
                return Ok(accumulated);
            }
            if let Ok(record) = serde_json::from_str::<ErrorRecord>(payload) {
                return Err(RelayError::Upstream(record.error));
            }
            match serde_json::from_str::<StreamChunk>(payload) {
                Ok(chunk) => {
                    let delta = chunk.choices
                        .first()
                        .and_then(|c| c.delta.content.as_deref())
                        .unwrap_or("");
                    accumulated.push_str(delta);
                    on_partial(&accumulated);
                }
                Err(e) => {
                    warn!("Skipping malformed stream line: {} ({})", line, e);
                }
            }
        }
    }

    Err(RelayError::TruncatedStream)
}
