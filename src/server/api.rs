use crate::cli::Args;
use crate::models::chat::ChatRequest;
use crate::sse;
use crate::upstream::UpstreamClient;
use axum::{
    body::{ Body, Bytes },
    extract::{ Path, State },
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::StreamExt;
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use log::{ error, info, warn };
use serde_json::{ json, Value };
use std::convert::Infallible;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::services::ServeDir;
use uuid::Uuid;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
struct AppState {
    upstream: Arc<dyn UpstreamClient>,
    chat_limiter: Arc<DirectLimiter>,
}

pub fn router(upstream: Arc<dyn UpstreamClient>, args: &Args) -> Router {
    let rate = NonZeroU32::new(args.chat_rate_limit).unwrap_or(NonZeroU32::MIN);
    let state = AppState {
        upstream,
        chat_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route(
            "/api/v1/services/aigc/text2image/image-synthesis",
            post(create_image_handler)
        )
        .route("/api/v1/tasks/{task_id}", get(task_status_handler))
        .fallback_service(ServeDir::new(&args.static_dir))
        .layer(cors)
        .with_state(state)
}

/// Streams a chat completion back as a text event stream: one `data: <json>`
/// record per upstream chunk, closed by `data: [DONE]`. Any upstream failure
/// becomes a single in-band `data: {"error": ...}` record; there is no retry.
async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    if state.chat_limiter.check().is_err() {
        warn!("Chat rate limit exceeded. Shedding request.");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many requests" })),
        ).into_response();
    }

    if req.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "messages must not be empty" })),
        ).into_response();
    }

    let request_id = Uuid::new_v4();
    info!("[{}] Chat request with {} messages", request_id, req.messages.len());

    let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, Infallible>>(32);
    let upstream = state.upstream.clone();
    let messages = req.messages;

    tokio::spawn(async move {
        match upstream.stream_chat(messages).await {
            Ok(mut chunks) => {
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(payload) => {
                            let record = sse::data_record(&payload);
                            if tx.send(Ok(Bytes::from(record))).await.is_err() {
                                info!("[{}] Client disconnected mid-stream", request_id);
                                return;
                            }
                        }
                        Err(e) => {
                            error!("[{}] Upstream stream failed: {}", request_id, e);
                            let record = sse::error_record(&e.to_string());
                            let _ = tx.send(Ok(Bytes::from(record))).await;
                            return;
                        }
                    }
                }
                let done = sse::data_record(sse::DONE_SENTINEL);
                let _ = tx.send(Ok(Bytes::from(done))).await;
                info!("[{}] Chat stream complete", request_id);
            }
            Err(e) => {
                error!("[{}] Upstream call failed: {}", request_id, e);
                let record = sse::error_record(&e.to_string());
                let _ = tx.send(Ok(Bytes::from(record))).await;
            }
        }
    });

    let headers = [
        (header::CONTENT_TYPE, "text/event-stream"),
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
    ];
    (headers, Body::from_stream(ReceiverStream::new(rx))).into_response()
}

/// Pass-through to the upstream image-synthesis endpoint. The upstream
/// status and JSON body are returned verbatim; only an unreachable upstream
/// is reported by the relay itself.
async fn create_image_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    info!("Image-synthesis request received");
    match state.upstream.create_image_task(body).await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(resp.body)).into_response()
        }
        Err(e) => {
            error!("Image-synthesis proxy failed: {}", e);
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Pass-through task-status poll.
async fn task_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>
) -> Response {
    info!("Task-status poll for {}", task_id);
    match state.upstream.task_status(&task_id).await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(resp.body)).into_response()
        }
        Err(e) => {
            error!("Task-status proxy failed for {}: {}", task_id, e);
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
