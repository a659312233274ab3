//! HTTP transports: MCP over Server-Sent Events and single-response POST.
//!
//! SSE clients open `GET {sse_path}`, receive an `endpoint` event naming the
//! URL to post to, and then get every response as a `message` event on that
//! stream. Each stream is its own session with its own [`Dispatcher`].

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, Transport};
use crate::error::{Error, Result};
use crate::mcp::dispatcher::{Dispatcher, MethodHandler};
use crate::mcp::protocol::{ServerInfo, MCP_VERSION};
use crate::metrics::Metrics;

/// Route paths for the SSE transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsePaths {
    pub sse_path: String,
    pub message_path: String,
}

impl Default for SsePaths {
    fn default() -> Self {
        Self {
            sse_path: "/sse".to_string(),
            message_path: "/messages".to_string(),
        }
    }
}

/// One open SSE stream.
#[derive(Clone)]
struct Session {
    dispatcher: Arc<Dispatcher>,
    outbox: mpsc::UnboundedSender<String>,
}

/// Removes its session when the event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Arc<DashMap<String, Session>>,
    metrics: Arc<Metrics>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some((_, session)) = self.sessions.remove(&self.id) {
            session.dispatcher.close();
        }
        self.metrics.session_closed();
        info!("SSE session {} closed", self.id);
    }
}

/// HTTP server state.
#[derive(Clone)]
pub struct HttpState {
    handler: Arc<dyn MethodHandler>,
    info: ServerInfo,
    metrics: Arc<Metrics>,
    paths: SsePaths,
    sessions: Arc<DashMap<String, Session>>,
    /// Single session used by the streamable transport.
    direct: Arc<Dispatcher>,
}

impl HttpState {
    pub fn new(
        handler: Arc<dyn MethodHandler>,
        info: ServerInfo,
        metrics: Arc<Metrics>,
        paths: SsePaths,
    ) -> Self {
        let direct = Arc::new(Dispatcher::with_metrics(handler.clone(), metrics.clone()));
        Self {
            handler,
            info,
            metrics,
            paths,
            sessions: Arc::new(DashMap::new()),
            direct,
        }
    }

    /// Number of open SSE sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn with_common_routes(router: Router<HttpState>, state: HttpState) -> Router {
    router
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the SSE transport.
pub fn sse_router(state: HttpState) -> Router {
    let router = Router::new()
        .route(&state.paths.sse_path, get(open_stream))
        .route(&state.paths.message_path, post(post_message));
    with_common_routes(router, state)
}

/// Router for the streamable transport: `POST /mcp` answers in the response body.
pub fn streamable_router(state: HttpState) -> Router {
    let router = Router::new().route("/mcp", post(post_direct));
    with_common_routes(router, state)
}

/// Bind and serve until Ctrl-C.
pub async fn start_server(config: &Config, state: HttpState) -> Result<()> {
    let app = match config.transport {
        Transport::Sse => sse_router(state),
        Transport::StreamableHttp => streamable_router(state),
        Transport::Stdio => {
            return Err(Error::Config(
                "stdio transport has no HTTP server".to_string(),
            ))
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting HTTP server on {} ({:?})", addr, config.transport);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::HttpServer(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
        })
        .await
        .map_err(|e| Error::HttpServer(e.to_string()))?;

    Ok(())
}

/// Health check endpoint.
async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "name": state.info.name,
        "version": state.info.version,
        "protocolVersion": MCP_VERSION,
    }))
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

async fn open_stream(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let id = Uuid::new_v4().to_string();
    let (outbox, inbox) = mpsc::unbounded_channel::<String>();
    let dispatcher = Arc::new(Dispatcher::with_metrics(
        state.handler.clone(),
        state.metrics.clone(),
    ));
    state
        .sessions
        .insert(id.clone(), Session { dispatcher, outbox });
    state.metrics.session_opened();
    info!("SSE session {} opened", id);

    let endpoint = format!("{}?sessionId={}", state.paths.message_path, id);
    let guard = SessionGuard {
        id,
        sessions: state.sessions.clone(),
        metrics: state.metrics.clone(),
    };

    let events = stream::once(async move { Event::default().event("endpoint").data(endpoint) })
        .chain(
            UnboundedReceiverStream::new(inbox)
                .map(|message| Event::default().event("message").data(message)),
        )
        .map(move |event| {
            let _session = &guard;
            Ok::<_, Infallible>(event)
        });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn post_message(
    State(state): State<HttpState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };
    let Some(session) = state.sessions.get(&id).map(|s| s.value().clone()) else {
        warn!("Message for unknown session {}", id);
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };

    tokio::spawn(async move {
        if let Some(response) = session.dispatcher.handle_bytes(&body).await {
            if session.outbox.send(response).is_err() {
                debug!("Session {} closed before its response was sent", id);
            }
        }
    });

    StatusCode::ACCEPTED.into_response()
}

async fn post_direct(State(state): State<HttpState>, body: Bytes) -> Response {
    match state.direct.handle_bytes(&body).await {
        Some(response) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response,
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::ToolRegistry;
    use crate::mcp::server::ToolServer;
    use axum::body::{Body, BodyDataStream};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> HttpState {
        let info = ServerInfo {
            name: "http-test".to_string(),
            version: "9.9.9".to_string(),
        };
        let handler = Arc::new(ToolServer::new(Arc::new(ToolRegistry::new()), info.clone()));
        HttpState::new(handler, info, Metrics::new(), SsePaths::default())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Reads whole SSE events off a body stream, skipping keep-alive comments.
    struct EventReader {
        stream: BodyDataStream,
        buffer: String,
    }

    impl EventReader {
        async fn next_event(&mut self) -> (String, String) {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let block: String = self.buffer.drain(..end + 2).collect();
                    let mut event = String::new();
                    let mut data = String::new();
                    for line in block.lines() {
                        if let Some(v) = line.strip_prefix("event:") {
                            event = v.trim().to_string();
                        } else if let Some(v) = line.strip_prefix("data:") {
                            data = v.trim().to_string();
                        }
                    }
                    if !event.is_empty() {
                        return (event, data);
                    }
                    continue;
                }
                let chunk = self.stream.next().await.unwrap().unwrap();
                self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = sse_router(state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["name"], "http-test");
        assert_eq!(json["version"], "9.9.9");
        assert_eq!(json["protocolVersion"], MCP_VERSION);
    }

    #[tokio::test]
    async fn test_message_without_session() {
        let app = sse_router(state());
        let response = app
            .oneshot(
                Request::post("/messages")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_message_unknown_session() {
        let app = sse_router(state());
        let response = app
            .oneshot(
                Request::post("/messages?sessionId=nope")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sse_session_round_trip() {
        let state = state();
        let app = sse_router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut events = EventReader {
            stream: response.into_body().into_data_stream(),
            buffer: String::new(),
        };

        let (event, endpoint) = events.next_event().await;
        assert_eq!(event, "endpoint");
        assert!(endpoint.starts_with("/messages?sessionId="));
        assert_eq!(state.session_count(), 1);

        let posted = app
            .clone()
            .oneshot(
                Request::post(endpoint.as_str())
                    .body(Body::from(
                        r#"{"jsonrpc":"2.0","method":"initialize","id":42}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(posted.status(), StatusCode::ACCEPTED);

        let (event, data) = events.next_event().await;
        assert_eq!(event, "message");
        let message: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(message["id"], 42);
        assert_eq!(message["result"]["protocolVersion"], MCP_VERSION);

        drop(events);
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test]
    async fn test_custom_paths() {
        let info = ServerInfo {
            name: "paths".to_string(),
            version: "1".to_string(),
        };
        let handler = Arc::new(ToolServer::new(Arc::new(ToolRegistry::new()), info.clone()));
        let paths = SsePaths {
            sse_path: "/events".to_string(),
            message_path: "/rpc".to_string(),
        };
        let app = sse_router(HttpState::new(handler, info, Metrics::new(), paths));

        let response = app
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut events = EventReader {
            stream: response.into_body().into_data_stream(),
            buffer: String::new(),
        };
        let (_, endpoint) = events.next_event().await;
        assert!(endpoint.starts_with("/rpc?sessionId="));
    }

    #[tokio::test]
    async fn test_streamable_post() {
        let app = streamable_router(state());

        let response = app
            .clone()
            .oneshot(
                Request::post("/mcp")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":"p"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let json = body_json(response).await;
        assert_eq!(json["id"], "p");

        let notification = app
            .oneshot(
                Request::post("/mcp")
                    .body(Body::from(
                        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(notification.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_streamable_invalid_utf8_is_parse_error() {
        let app = streamable_router(state());
        let response = app
            .oneshot(
                Request::post("/mcp")
                    .body(Body::from(vec![0xff, 0xfe, b'{']))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32700);
        assert!(json["id"].is_null());
    }

    #[tokio::test]
    async fn test_sse_invalid_utf8_is_parse_error() {
        let app = sse_router(state());
        let response = app
            .clone()
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut events = EventReader {
            stream: response.into_body().into_data_stream(),
            buffer: String::new(),
        };
        let (_, endpoint) = events.next_event().await;

        let posted = app
            .oneshot(
                Request::post(endpoint.as_str())
                    .body(Body::from(vec![0xff, 0xfe, b'{']))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(posted.status(), StatusCode::ACCEPTED);

        let (event, data) = events.next_event().await;
        assert_eq!(event, "message");
        let message: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(message["error"]["code"], -32700);
        assert!(message["id"].is_null());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = streamable_router(state());
        let _ = app
            .clone()
            .oneshot(
                Request::post("/mcp")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("mcp_requests_total 1"));
    }
}
