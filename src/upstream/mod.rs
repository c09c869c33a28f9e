use async_trait::async_trait;
use futures::Stream;
use futures_util::StreamExt;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::cli::Args;
use crate::error::{ RelayError, Result };
use crate::models::chat::ChatMessage;
use crate::sse::{ self, LineFramer };

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Upstream response forwarded verbatim: the status code and the JSON body
/// exactly as the provider returned them.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Opens a streaming chat completion and yields each upstream chunk as
    /// its raw JSON payload, in arrival order. The upstream `[DONE]` marker
    /// is consumed, never yielded.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<ChunkStream>;

    /// Submits an image-synthesis request, pass-through.
    async fn create_image_task(&self, body: Value) -> Result<ProxiedResponse>;

    /// Fetches the status of an asynchronous task, pass-through.
    async fn task_status(&self, task_id: &str) -> Result<ProxiedResponse>;
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// Client for the DashScope APIs: OpenAI-compatible chat completion plus the
/// asynchronous text-to-image endpoints.
pub struct DashScopeClient {
    http: HttpClient,
    api_key: String,
    chat_base_url: String,
    image_base_url: String,
    model: String,
    proxy_timeout: Duration,
}

impl DashScopeClient {
    pub fn new(args: &Args) -> Result<Self> {
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(args.upstream_connect_timeout))
            .build()?;

        Ok(Self {
            http,
            api_key: args.upstream_api_key.clone(),
            chat_base_url: args.chat_base_url.clone(),
            image_base_url: args.image_base_url.clone(),
            model: args.chat_model.clone(),
            proxy_timeout: Duration::from_secs(args.proxy_timeout),
        })
    }

    pub fn new_arc(args: &Args) -> Result<Arc<dyn UpstreamClient>> {
        Ok(Arc::new(Self::new(args)?))
    }

    async fn forward(&self, req: reqwest::RequestBuilder) -> Result<ProxiedResponse> {
        let resp = req.timeout(self.proxy_timeout).send().await?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await?;
        Ok(ProxiedResponse { status, body })
    }
}

#[async_trait]
impl UpstreamClient for DashScopeClient {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<ChunkStream> {
        let url = format!("{}/chat/completions", self.chat_base_url.trim_end_matches('/'));
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            stream: true,
        };

        let resp = self.http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        if resp.error_for_status_ref().is_err() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Status { status, body });
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            let mut framer = LineFramer::new();

            'read: while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        for line in framer.push(&buf) {
                            let Some(payload) = sse::data_payload(&line) else {
                                continue;
                            };
                            if payload == sse::DONE_SENTINEL {
                                break 'read;
                            }
                            if payload.is_empty() {
                                continue;
                            }
                            if tx.send(Ok(payload.to_string())).await.is_err() {
                                debug!("Chat stream receiver dropped, stopping upstream read");
                                break 'read;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(RelayError::Http(e))).await;
                        break 'read;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn create_image_task(&self, body: Value) -> Result<ProxiedResponse> {
        let url = format!(
            "{}/services/aigc/text2image/image-synthesis",
            self.image_base_url.trim_end_matches('/')
        );
        info!("Forwarding image-synthesis request to {}", url);

        let req = self.http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body);
        self.forward(req).await
    }

    async fn task_status(&self, task_id: &str) -> Result<ProxiedResponse> {
        let url = format!("{}/tasks/{}", self.image_base_url.trim_end_matches('/'), task_id);
        debug!("Forwarding task-status poll to {}", url);

        let req = self.http.get(&url).bearer_auth(&self.api_key);
        self.forward(req).await
    }
}
