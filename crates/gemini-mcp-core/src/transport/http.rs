//! HTTP transport: JSON request/response, event streams and the WebSocket upgrade
//!
//! Routes:
//! - `GET /health`
//! - `GET /info`
//! - `GET /tools`
//! - `POST /tools/:name`
//! - `POST /tools/:name/stream` (`text/event-stream`)
//! - `GET /ws`
//!
//! When an auth token is configured every route except `/health` requires
//! `Authorization: Bearer <token>`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Request, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::session::{ConnectionSession, TransportKind};
use super::websocket::{handle_socket, WebSocketAdapter};
use crate::ai::sse::encode_event;
use crate::dispatch::{Dispatcher, FailureKind, InvocationRequest, InvocationResult, ToolFailure};
use crate::mcp::ServerInfo;
use crate::tools::ToolDescriptor;

#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
    info: Arc<ServerInfo>,
    websocket: WebSocketAdapter,
    auth_token: Option<Arc<str>>,
}

/// Build the HTTP router over `dispatcher`
pub fn router(dispatcher: Dispatcher, auth_token: Option<String>) -> Router {
    let state = AppState {
        info: Arc::new(ServerInfo::from_catalog(dispatcher.catalog())),
        websocket: WebSocketAdapter::new(dispatcher.clone()),
        dispatcher,
        auth_token: auth_token.filter(|t| !t.is_empty()).map(Arc::from),
    };

    let protected = Router::new()
        .route("/info", get(server_info))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .route("/tools/:name/stream", post(stream_tool))
        .route("/ws", get(websocket_upgrade))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve `router` on `addr` until `shutdown` fires
pub async fn serve(router: Router, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr().context("Listener has no local address")?;
    info!("HTTP server listening on {}", local);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented.is_some_and(|token| tokens_match(token.as_bytes(), expected.as_bytes())) {
        next.run(request).await
    } else {
        warn!("Rejected unauthenticated request to {}", request.uri().path());
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": { "kind": "Unauthorized", "message": "Missing or invalid bearer token" }
            })),
        )
            .into_response()
    }
}

/// Constant-time for tokens of equal length
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo::clone(&state.info))
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.dispatcher.catalog().descriptors())
}

fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::UnknownTool => StatusCode::NOT_FOUND,
        FailureKind::InvalidParameters
        | FailureKind::TransportDecodeError
        | FailureKind::UnknownMessageType => StatusCode::BAD_REQUEST,
        FailureKind::BackendRejected | FailureKind::BackendUnavailable | FailureKind::Cancelled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn failure_response(failure: ToolFailure) -> Response {
    (
        status_for(failure.kind),
        Json(json!({ "success": false, "error": failure })),
    )
        .into_response()
}

/// An empty body means no parameters
fn parse_body(body: &Bytes) -> Result<Value, ToolFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| ToolFailure::decode(format!("Invalid JSON body: {}", e)))
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let parameters = match parse_body(&body) {
        Ok(parameters) => parameters,
        Err(failure) => return failure_response(failure),
    };

    // Dropped with this future if the client goes away, cancelling the call
    let mut session = ConnectionSession::new(TransportKind::Http);
    let id = json!(session.id().to_string());
    let cancel = session.begin_call(&id);

    let result = state
        .dispatcher
        .handle(InvocationRequest::new(id.clone(), name, parameters), cancel)
        .await;
    session.finish_call(&id);

    match result {
        InvocationResult::Success { payload } => {
            Json(json!({ "success": true, "result": payload })).into_response()
        }
        InvocationResult::Failure(failure) => failure_response(failure),
    }
}

async fn stream_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let parameters = match parse_body(&body) {
        Ok(parameters) => parameters,
        Err(failure) => return failure_response(failure),
    };

    let mut session = ConnectionSession::new(TransportKind::EventStream);
    let id = json!(session.id().to_string());
    let request = InvocationRequest::new(id.clone(), name, parameters);

    // Requests that cannot start get a plain status code instead of a stream
    if let Err(failure) = state.dispatcher.validate(&request) {
        return failure_response(failure);
    }

    let cancel = session.begin_stream(&id);
    let events = state.dispatcher.handle_stream(request, cancel);
    debug!("Event stream {} opened", id);

    // The session lives as long as the body; dropping the body cancels the call
    let frames = events.map(move |event| {
        let _alive = &session;
        Ok::<_, Infallible>(encode_event(&event.to_json()))
    });

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(frames),
    )
        .into_response()
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let adapter = state.websocket.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, adapter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::ai::backend::BackendError;
    use crate::dispatch::test_support::{dispatcher_over, eventually, StubBackend};
    use std::time::Duration;

    fn app(backend: StubBackend) -> Router {
        router(dispatcher_over(Arc::new(backend)), None)
    }

    fn post_json(uri: &str, body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(StubBackend::replying("4")).oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_info() {
        let response = app(StubBackend::replying("4")).oneshot(get_req("/info")).await.unwrap();
        let info = read_json(response).await;
        assert_eq!(info["name"], "gemini-mcp");
        assert_eq!(info["capabilities"]["tools"][0], "ask_gemini");
        assert_eq!(info["capabilities"]["resources"][1], "gemini://tools");
    }

    #[tokio::test]
    async fn test_call_success() {
        let response = app(StubBackend::replying("4"))
            .oneshot(post_json(
                "/tools/ask_gemini",
                r#"{"model":"gemini-2.0-flash","query":"2+2"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "success": true, "result": "4" }));
    }

    #[tokio::test]
    async fn test_failure_status_codes() {
        let router = app(StubBackend::replying("4"));

        let unknown = router
            .clone()
            .oneshot(post_json("/tools/nope", "{}"))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(unknown).await["error"]["kind"], "UnknownTool");

        let invalid = router
            .clone()
            .oneshot(post_json("/tools/ask_gemini", r#"{"model":"m"}"#))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(invalid).await["error"]["kind"], "InvalidParameters");

        let malformed = router
            .oneshot(post_json("/tools/ask_gemini", "{oops"))
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(malformed).await["error"]["kind"], "TransportDecodeError");
    }

    #[tokio::test]
    async fn test_backend_exhaustion_is_500() {
        let backend = StubBackend::replying("4").failing_first(vec![
            BackendError::http(500, "down"),
            BackendError::http(500, "down"),
            BackendError::http(500, "down"),
        ]);
        let response = app(backend)
            .oneshot(post_json("/tools/ask_gemini", r#"{"model":"m","query":"q"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "BackendUnavailable");
        assert_eq!(body["error"]["message"], "Maximum retries exceeded");
    }

    #[tokio::test]
    async fn test_tool_list_under_concurrency() {
        let router = app(StubBackend::replying("4"));
        let expected = vec!["ask_gemini", "chat_with_gemini", "stream_gemini", "gemini_function_call"];

        let requests: Vec<_> = (0..16)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move {
                    let response = router.oneshot(get_req("/tools")).await.unwrap();
                    read_json(response).await
                })
            })
            .collect();

        for request in requests {
            let tools = request.await.unwrap();
            let names: Vec<&str> = tools
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["name"].as_str().unwrap())
                .collect();
            assert_eq!(names, expected);
        }
    }

    #[tokio::test]
    async fn test_event_stream() {
        let backend = StubBackend::replying("")
            .with_chunks(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let response = app(backend)
            .oneshot(post_json("/tools/stream_gemini/stream", r#"{"model":"m","query":"q"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            String::from_utf8(bytes.to_vec()).unwrap(),
            "data: {\"text\":\"a\"}\n\ndata: {\"text\":\"b\"}\n\ndata: {\"done\":true}\n\n"
        );
    }

    #[tokio::test]
    async fn test_event_stream_mid_failure() {
        let backend = StubBackend::replying("")
            .with_chunks(vec![Ok("a".to_string()), Err(BackendError::decode("garbage"))]);
        let response = app(backend)
            .oneshot(post_json("/tools/stream_gemini/stream", r#"{"model":"m","query":"q"}"#))
            .await
            .unwrap();

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 2);
        let last: Value = serde_json::from_str(frames[1].trim_start_matches("data: ")).unwrap();
        assert_eq!(last["error"]["kind"], "BackendRejected");
    }

    #[tokio::test]
    async fn test_stream_of_unknown_tool_is_404() {
        let response = app(StubBackend::replying("4"))
            .oneshot(post_json("/tools/nope/stream", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bearer_gate() {
        let router = router(
            dispatcher_over(Arc::new(StubBackend::replying("4"))),
            Some("s3cret".to_string()),
        );

        let health = router.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let anonymous = router.clone().oneshot(get_req("/tools")).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let wrong = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/tools")
                    .header(AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let authorized = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/tools")
                    .header(AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(authorized.status(), StatusCode::OK);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"s3cret", b"s3cret"));
        assert!(!tokens_match(b"s3creT", b"s3cret"));
        assert!(!tokens_match(b"s3cret!", b"s3cret"));
        assert!(!tokens_match(b"", b"s3cret"));
    }

    #[tokio::test]
    async fn test_dropped_request_cancels_call() {
        let backend = Arc::new(StubBackend::replying("4").with_latency(Duration::from_secs(30)));
        let router = router(dispatcher_over(backend.clone()), None);

        let request = tokio::spawn(async move {
            router
                .oneshot(post_json("/tools/ask_gemini", r#"{"model":"m","query":"q"}"#))
                .await
        });
        eventually(|| backend.calls() == 1).await;

        request.abort();
        eventually(|| backend.abandoned() == 1).await;
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_dropped_event_stream_cancels_call() {
        let backend = Arc::new(
            StubBackend::replying("")
                .with_chunks(vec![Ok("a".to_string())])
                .with_latency(Duration::from_secs(30)),
        );
        let response = router(dispatcher_over(backend.clone()), None)
            .oneshot(post_json("/tools/stream_gemini/stream", r#"{"model":"m","query":"q"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let reader = tokio::spawn(async move { response.into_body().collect().await.map(|_| ()) });
        eventually(|| backend.calls() == 1).await;

        reader.abort();
        eventually(|| backend.abandoned() == 1).await;
        assert_eq!(backend.calls(), 1);
    }
}
