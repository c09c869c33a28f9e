//! End-to-end: a relay with a scripted upstream, driven over real HTTP by
//! the stream-consumer client.

use async_trait::async_trait;
use celadon_relay::cli::Args;
use celadon_relay::client::{ CancelHandle, ChatSession, SessionState };
use celadon_relay::client::task::{ poll_task, RelayTasks };
use celadon_relay::error::{ RelayError, Result };
use celadon_relay::models::chat::{ ChatMessage, Role };
use celadon_relay::server::api;
use celadon_relay::upstream::{ ChunkStream, ProxiedResponse, UpstreamClient };
use clap::Parser;
use serde_json::{ json, Value };
use std::sync::Arc;
use std::time::Duration;

struct ScriptedUpstream {
    chunks: Vec<std::result::Result<String, String>>,
    task_polls: Vec<Value>,
    task_calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn stream_chat(&self, _messages: Vec<ChatMessage>) -> Result<ChunkStream> {
        let items: Vec<Result<String>> = self.chunks
            .iter()
            .map(|c| {
                match c {
                    Ok(payload) => Ok(payload.clone()),
                    Err(message) => Err(RelayError::Upstream(message.clone())),
                }
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn create_image_task(&self, _body: Value) -> Result<ProxiedResponse> {
        Ok(ProxiedResponse {
            status: 200,
            body: json!({ "output": { "task_id": "task-9" } }),
        })
    }

    async fn task_status(&self, _task_id: &str) -> Result<ProxiedResponse> {
        let call = self.task_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let body = self.task_polls
            .get(call.min(self.task_polls.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| json!({ "output": { "task_status": "FAILED" } }));
        Ok(ProxiedResponse { status: 200, body })
    }
}

fn delta(content: &str) -> std::result::Result<String, String> {
    Ok(json!({ "choices": [{ "delta": { "content": content } }] }).to_string())
}

async fn spawn_relay(upstream: ScriptedUpstream) -> String {
    let args = Args::parse_from(["celadon-relay"]);
    let app = api::router(Arc::new(upstream), &args);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn chat_roundtrip_accumulates_and_commits_the_reply() {
    let base = spawn_relay(ScriptedUpstream {
        chunks: vec![delta("你"), delta("好"), delta("！")],
        task_polls: vec![],
        task_calls: std::sync::atomic::AtomicUsize::new(0),
    }).await;

    let mut session = ChatSession::with_system(
        format!("{}/api/chat", base),
        "You are a ceramics guide."
    );
    let cancel = CancelHandle::new();
    let mut partials = Vec::new();

    let reply = session
        .send("hello", &cancel, |p| partials.push(p.to_string())).await
        .unwrap();

    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "你好！");
    assert_eq!(partials, vec!["你", "你好", "你好！"]);
    assert_eq!(session.state(), SessionState::Finalized);

    // system + user + assistant, in order
    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[2].role, Role::Assistant);
}

#[tokio::test]
async fn upstream_failure_leaves_conversation_without_a_reply() {
    let base = spawn_relay(ScriptedUpstream {
        chunks: vec![Err("upstream unreachable".to_string())],
        task_polls: vec![],
        task_calls: std::sync::atomic::AtomicUsize::new(0),
    }).await;

    let mut session = ChatSession::new(format!("{}/api/chat", base));
    let cancel = CancelHandle::new();

    let err = session.send("hello", &cancel, |_| {}).await.unwrap_err();

    match err {
        RelayError::Upstream(message) => assert_eq!(message, "upstream unreachable"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Errored);

    // The user message stays; no assistant message was appended.
    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    // The session is usable again after an error.
    let err = session.send("again", &cancel, |_| {}).await.unwrap_err();
    assert!(matches!(err, RelayError::Upstream(_)));
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn image_task_created_and_polled_to_success() {
    let base = spawn_relay(ScriptedUpstream {
        chunks: vec![],
        task_polls: vec![
            json!({ "output": { "task_status": "PENDING" } }),
            json!({
                "output": {
                    "task_status": "SUCCEEDED",
                    "results": [{ "url": "https://img.example/vase.png" }]
                }
            })
        ],
        task_calls: std::sync::atomic::AtomicUsize::new(0),
    }).await;

    let tasks = RelayTasks::new(base);
    let task_id = tasks
        .create_task(json!({ "model": "wanx-v1", "input": { "prompt": "a celadon vase" } })).await
        .unwrap();
    assert_eq!(task_id, "task-9");

    let cancel = CancelHandle::new();
    let url = poll_task(&tasks, &task_id, Duration::from_millis(1), &cancel).await.unwrap();
    assert_eq!(url, "https://img.example/vase.png");
}
