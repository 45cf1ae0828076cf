//! OpenAI-compatible embedding provider against a local axum server.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use content_sync::config::EmbeddingConfig;
use content_sync::embedding::{EmbeddingProvider, OpenAIProvider};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct EmbedState {
    hits: AtomicUsize,
    /// Answer this many calls with 503 before succeeding.
    unavailable_for: AtomicUsize,
    reject: bool,
}

async fn embeddings(
    State(state): State<Arc<EmbedState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-key") {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    if state.reject {
        return (StatusCode::BAD_REQUEST, "input too long").into_response();
    }
    let pending = state.unavailable_for.load(Ordering::SeqCst);
    if pending > 0 {
        state.unavailable_for.store(pending - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }

    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    // Reverse order so the client has to sort by index
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, _)| json!({"index": i, "embedding": [i as f32, 1.0]}))
        .collect();
    Json(json!({"data": data})).into_response()
}

async fn serve(state: EmbedState) -> (String, Arc<EmbedState>) {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1", addr), state)
}

fn provider(base_url: &str, max_retries: u32) -> OpenAIProvider {
    let config = EmbeddingConfig {
        provider: "openai".into(),
        model: Some("test-embed".into()),
        dims: Some(2),
        base_url: base_url.to_string(),
        max_retries,
        retry_base_delay_ms: 1,
        ..Default::default()
    };
    OpenAIProvider::with_api_key(&config, "test-key".into()).unwrap()
}

fn texts() -> Vec<String> {
    vec!["first".into(), "second".into(), "third".into()]
}

#[tokio::test]
async fn test_vectors_come_back_in_input_order() {
    let (url, _state) = serve(EmbedState::default()).await;
    let vectors = provider(&url, 0).embed(&texts()).await.unwrap();
    assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]]);
}

#[tokio::test]
async fn test_server_errors_retry_on_embedding_budget() {
    let (url, state) = serve(EmbedState {
        unavailable_for: AtomicUsize::new(2),
        ..Default::default()
    })
    .await;
    let vectors = provider(&url, 2).embed(&texts()).await.unwrap();
    assert_eq!(vectors.len(), 3);
    assert_eq!(state.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_stop_after_max_retries() {
    let (url, state) = serve(EmbedState {
        unavailable_for: AtomicUsize::new(10),
        ..Default::default()
    })
    .await;
    let err = provider(&url, 1).embed(&texts()).await.unwrap_err();
    assert!(err.to_string().contains("503"), "{}", err);
    assert_eq!(state.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (url, state) = serve(EmbedState {
        reject: true,
        ..Default::default()
    })
    .await;
    let err = provider(&url, 3).embed(&texts()).await.unwrap_err();
    assert!(err.to_string().contains("input too long"), "{}", err);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
}
