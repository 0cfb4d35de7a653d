//! HTTP Endpoints
//!
//! REST API for chat turns and session management.

use std::time::Duration;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use ragchat_agent::{TurnRequest, TurnResponse};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let request_timeout = Duration::from_secs(config.server.timeout_seconds);
    drop(config);

    Router::new()
        .route("/chat", post(chat))
        // One parameter name per segment: user ID for GET, session ID for DELETE
        .route("/sessions/:id", get(list_sessions).delete(delete_session))
        .route("/sessions/:id/history", get(session_history))
        .route("/sessions/:id/summarize", post(summarize_session))
        .route("/cleanup", post(cleanup))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CompressionLayer::new())
                .layer(cors_layer),
        )
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty or all invalid, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return layer.allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    layer.allow_origin(parsed_origins)
}

/// POST /chat
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ServerError> {
    let response = state.orchestrator.process_turn(request).await?;
    Ok(Json(response))
}

/// GET /sessions/:user_id
async fn list_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let sessions = state.store.list_sessions(&user_id).await?;
    Ok(Json(serde_json::json!({
        "user_id": user_id,
        "sessions": sessions,
    })))
}

/// GET /sessions/:session_id/history
async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let limit = state.get_config().session.history_limit;
    let history = state.store.read_history(&session_id, limit).await?;
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "history": history,
    })))
}

/// POST /sessions/:session_id/summarize
async fn summarize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.sessions.summarize_session(&session_id).await? {
        Some(summary) => Ok(Json(serde_json::json!({
            "session_id": session_id,
            "summary": summary,
        }))),
        None => Err(ServerError::NotFound("Session not found or empty".to_string())),
    }
}

/// DELETE /sessions/:session_id
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.sessions.evict(&session_id).await;
    if !state.store.delete_session(&session_id).await? {
        return Err(ServerError::NotFound("Session not found".to_string()));
    }

    tracing::info!(session_id = %session_id, "Session deleted");
    Ok(Json(serde_json::json!({
        "message": format!("Session {} deleted successfully", session_id),
    })))
}

/// POST /cleanup
async fn cleanup(State(state): State<AppState>) -> Json<serde_json::Value> {
    let evicted = state.sessions.cleanup_memory().await;
    Json(serde_json::json!({
        "message": format!("Cleaned up {} expired sessions", evicted),
        "evicted": evicted,
    }))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let store_ok = state.store.health_check().await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": if store_ok { "healthy" } else { "degraded" },
            "timestamp": Utc::now().to_rfc3339(),
            "active_sessions": state.sessions.active_sessions(),
            "store": {
                "status": if store_ok { "ok" } else { "unavailable" },
                "distributed": state.is_distributed_store(),
            },
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ragchat_config::Settings;
    use tower::ServiceExt;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let (status, body) = send(app, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_sessions"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_chat_then_history() {
        let state = AppState::in_memory(Settings::default());

        let (status, body) = send(
            create_router(state.clone()),
            post_json("/chat", serde_json::json!({ "query": "hello", "user_id": "u1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "u1");
        assert!(body["response"].as_str().unwrap().contains("Question: hello"));
        assert!(body["suggested_questions"].as_array().unwrap().is_empty());
        assert!(body.get("persisted").is_none());

        let session_id = body["session_id"].as_str().unwrap().to_string();
        let (status, body) = send(
            create_router(state.clone()),
            get(&format!("/sessions/{}/history", session_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["history"].as_array().unwrap().len(), 1);
        assert_eq!(body["history"][0]["query"], "hello");

        let (status, body) = send(create_router(state), get("/sessions/u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions"][0]["session_id"], session_id.as_str());
    }

    #[tokio::test]
    async fn test_chat_accepts_plain_text_documents() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let (status, body) = send(
            app,
            post_json(
                "/chat",
                serde_json::json!({ "query": "q", "documents": ["grounding text"] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["response"].as_str().unwrap().contains("grounding text"));
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_query() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let (status, body) = send(app, post_json("/chat", serde_json::json!({ "query": "  " }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("query"));
    }

    #[tokio::test]
    async fn test_summarize_unknown_session_is_404() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let (status, body) = send(app, post_json("/sessions/nope/summarize", serde_json::json!({}))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Session not found or empty");
    }

    #[tokio::test]
    async fn test_delete_session() {
        let state = AppState::in_memory(Settings::default());
        let (_, body) = send(
            create_router(state.clone()),
            post_json("/chat", serde_json::json!({ "query": "q", "session_id": "s1" })),
        )
        .await;
        assert_eq!(body["session_id"], "s1");
        assert_eq!(state.sessions.active_sessions(), 1);

        let delete = Request::builder()
            .method("DELETE")
            .uri("/sessions/s1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(create_router(state.clone()), delete).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.sessions.active_sessions(), 0);

        let delete = Request::builder()
            .method("DELETE")
            .uri("/sessions/s1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(create_router(state), delete).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cleanup_reports_evictions() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let (status, body) = send(app, post_json("/cleanup", serde_json::json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["evicted"], 0);
        assert_eq!(body["message"], "Cleaned up 0 expired sessions");
    }
}
