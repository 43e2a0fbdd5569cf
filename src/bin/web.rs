//! Sprout HTTP 对话接口
//!
//! 启动: cargo run --bin sprout-web --features web
//! POST /api/chat  {"message": "...", "chat_history": [{"role": "user", "content": "..."}]}
//! 监听地址由 SPROUT_WEB_ADDR 指定，默认 127.0.0.1:8080

#![cfg(feature = "web")]

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use sprout::agent::parse_chat_request;
use sprout::config::load_config;
use sprout::core::AgentRuntime;
use sprout::observability;

const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
];

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, CORS_HEADERS, Json(body)).into_response()
}

async fn api_chat(State(runtime): State<Arc<AgentRuntime>>, body: Bytes) -> Response {
    let result = match parse_chat_request(&body) {
        Ok(request) => runtime.handle_chat(request).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(reply) => json_response(StatusCode::OK, reply),
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                tracing::error!(error = %e, "chat failed");
            }
            json_response(status, e.body())
        }
    }
}

async fn api_chat_options() -> Response {
    (StatusCode::NO_CONTENT, CORS_HEADERS).into_response()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let runtime = Arc::new(
        AgentRuntime::builder(cfg)
            .build()
            .await
            .context("Failed to create agent")?,
    );

    let app = Router::new()
        .route("/api/chat", post(api_chat).options(api_chat_options))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(Arc::clone(&runtime));

    let addr = std::env::var("SPROUT_WEB_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Sprout web listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
