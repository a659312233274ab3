//! JSON-RPC envelope handling shared by every server flavour.
//!
//! A [`Dispatcher`] validates envelopes, tracks the session lifecycle and
//! routes each request to a [`MethodHandler`]. Handler errors are turned into
//! error envelopes here; nothing a handler does can reach the transport as
//! anything other than a well-formed response.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::*;
use crate::metrics::Metrics;

/// A set of method implementations.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handle one method. Return `Err(Error::MethodNotFound)` for methods this
    /// handler does not offer.
    async fn call(&self, method: Method, params: Option<Value>) -> Result<Value>;
}

/// Externally visible lifecycle of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initialized,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initialized => 1,
            Self::Closed => 2,
        }
    }
}

/// Route a validated request to a handler without any lifecycle bookkeeping.
///
/// Used both by [`Dispatcher`] and for internal re-wrapped envelopes.
pub async fn route(handler: &dyn MethodHandler, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.unwrap_or(RequestId::Null);
    let outcome = match Method::parse(&request.method) {
        Some(method) => handler.call(method, request.params).await,
        None => Err(Error::MethodNotFound(request.method)),
    };

    match outcome {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, e.rpc_code(), e.to_string()),
    }
}

/// Validate a decoded JSON value as a request envelope.
///
/// The `jsonrpc` member is carried through as-is (empty when absent) and
/// checked by [`Dispatcher::handle`].
pub fn parse_envelope(value: Value) -> std::result::Result<JsonRpcRequest, JsonRpcResponse> {
    let invalid = |id: RequestId, reason: &str| {
        JsonRpcResponse::error(
            id,
            error_codes::INVALID_REQUEST,
            format!("Invalid Request: {}", reason),
        )
    };

    let Value::Object(mut obj) = value else {
        return Err(invalid(RequestId::Null, "expected a JSON object"));
    };

    let id = match obj.remove("id") {
        None => None,
        Some(Value::Null) => Some(RequestId::Null),
        Some(Value::String(s)) => Some(RequestId::String(s)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) => Some(RequestId::Number(n)),
            None => return Err(invalid(RequestId::Null, "id must be an integer")),
        },
        Some(_) => {
            return Err(invalid(
                RequestId::Null,
                "id must be a string, an integer or null",
            ))
        }
    };
    let reply_id = id.clone().unwrap_or(RequestId::Null);

    let jsonrpc = match obj.remove("jsonrpc") {
        Some(Value::String(version)) => version,
        _ => String::new(),
    };

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(invalid(reply_id, "method must be a string")),
    };

    let params = match obj.remove("params") {
        None | Some(Value::Null) => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
        Some(_) => return Err(invalid(reply_id, "params must be an object or an array")),
    };

    Ok(JsonRpcRequest {
        jsonrpc,
        method,
        params,
        id,
    })
}

/// Serialize a response to one line of JSON.
pub fn encode_response(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to encode response: {}", e);
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Failed to encode response"}}}}"#,
            error_codes::INTERNAL_ERROR
        )
    })
}

/// Envelope validation, lifecycle and routing for one client session.
pub struct Dispatcher {
    handler: Arc<dyn MethodHandler>,
    state: AtomicU8,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    /// Create a dispatcher with its own metrics.
    pub fn new(handler: Arc<dyn MethodHandler>) -> Self {
        Self::with_metrics(handler, Metrics::new())
    }

    /// Create a dispatcher reporting into shared metrics.
    pub fn with_metrics(handler: Arc<dyn MethodHandler>, metrics: Arc<Metrics>) -> Self {
        Self {
            handler,
            state: AtomicU8::new(SessionState::Uninitialized.as_u8()),
            metrics,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Tear down the session. Later requests are refused.
    pub fn close(&self) {
        let previous = self.state.swap(SessionState::Closed.as_u8(), Ordering::AcqRel);
        if SessionState::from_u8(previous) != SessionState::Closed {
            debug!("Dispatcher closed");
        }
    }

    /// Handle one request. Notifications yield `None`.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.metrics.inc_requests();
        let is_notification = request.is_notification();
        let reply_id = request.id.clone().unwrap_or(RequestId::Null);

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(self.fail(
                reply_id,
                error_codes::INVALID_REQUEST,
                format!(
                    "Invalid Request: jsonrpc must be \"{}\", got \"{}\"",
                    JSONRPC_VERSION, request.jsonrpc
                ),
            ));
        }

        let state = self.state();
        if state == SessionState::Closed {
            warn!("Request {} received after close", request.method);
            return (!is_notification).then(|| {
                self.fail(reply_id, Error::Closed.rpc_code(), Error::Closed.to_string())
            });
        }

        let Some(method) = Method::parse(&request.method) else {
            debug!("Unknown method: {}", request.method);
            return (!is_notification).then(|| {
                self.fail(
                    reply_id,
                    error_codes::METHOD_NOT_FOUND,
                    Error::MethodNotFound(request.method.clone()).to_string(),
                )
            });
        };

        if state == SessionState::Uninitialized && method != Method::Initialize {
            warn!("{} called before initialize", method);
        }

        debug!("Handling request: {} (id: {})", method, reply_id);
        let outcome = self.handler.call(method, request.params).await;

        let response = match outcome {
            Ok(value) => {
                if method == Method::Initialize {
                    self.state
                        .store(SessionState::Initialized.as_u8(), Ordering::Release);
                    info!("Session initialized");
                }
                if method == Method::ToolsCall {
                    self.metrics.inc_tool_calls();
                    if value.get("isError").and_then(Value::as_bool) == Some(true) {
                        self.metrics.inc_tool_errors();
                    }
                }
                JsonRpcResponse::success(reply_id, value)
            }
            Err(e) => {
                warn!("{} failed: {}", method, e);
                self.fail(reply_id, e.rpc_code(), e.to_string())
            }
        };

        (!is_notification).then_some(response)
    }

    /// Like [`handle_raw`](Self::handle_raw) for bytes straight off the wire.
    /// Input that is not UTF-8 is answered with a parse error.
    pub async fn handle_bytes(&self, bytes: &[u8]) -> Option<String> {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_raw(text).await,
            Err(e) => Some(self.parse_error(e)),
        }
    }

    /// Decode one raw message, handle it and encode the response.
    pub async fn handle_raw(&self, text: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Some(self.parse_error(e)),
        };

        match parse_envelope(value) {
            Ok(request) => self.handle(request).await.map(|r| encode_response(&r)),
            Err(response) => {
                self.metrics.inc_requests();
                self.metrics.inc_failed();
                Some(encode_response(&response))
            }
        }
    }

    fn parse_error(&self, e: impl std::fmt::Display) -> String {
        warn!("Failed to parse message: {}", e);
        self.metrics.inc_requests();
        let response = self.fail(
            RequestId::Null,
            error_codes::PARSE_ERROR,
            format!("Parse error: {}", e),
        );
        encode_response(&response)
    }

    fn fail(&self, id: RequestId, code: i32, message: String) -> JsonRpcResponse {
        self.metrics.inc_failed();
        JsonRpcResponse::error(id, code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl MethodHandler for Echo {
        async fn call(&self, method: Method, params: Option<Value>) -> Result<Value> {
            match method {
                Method::Initialize => Ok(json!({"protocolVersion": MCP_VERSION})),
                Method::Ping => Ok(json!({})),
                Method::ToolsList => Ok(params.unwrap_or(Value::Null)),
                Method::ToolsCall => Err(Error::InvalidParams("boom".to_string())),
                _ => Err(Error::MethodNotFound(method.to_string())),
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Echo))
    }

    async fn raw(d: &Dispatcher, text: &str) -> Value {
        let out = d.handle_raw(text).await.expect("expected a response");
        serde_json::from_str(&out).unwrap()
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let d = dispatcher();
        let response = raw(&d, "{not json").await;
        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_parse_error() {
        let d = dispatcher();
        let out = d.handle_bytes(b"\xff\xfe{").await.unwrap();
        let response: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());

        let out = d
            .handle_bytes(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#)
            .await
            .unwrap();
        let response: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let d = dispatcher();
        for text in [
            r#"{"jsonrpc":"1.0","method":"ping","id":1}"#,
            r#"{"method":"ping","id":1}"#,
            r#"{"jsonrpc":2.0,"method":"ping","id":1}"#,
        ] {
            let response = raw(&d, text).await;
            assert_eq!(response["error"]["code"], -32600, "{}", text);
            assert_eq!(response["id"], 1);
        }
    }

    #[tokio::test]
    async fn test_malformed_envelopes() {
        let d = dispatcher();
        for text in [
            "[]",
            "42",
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","method":5,"id":1}"#,
            r#"{"jsonrpc":"2.0","method":"ping","params":"x","id":1}"#,
            r#"{"jsonrpc":"2.0","method":"ping","id":{"a":1}}"#,
        ] {
            let response = raw(&d, text).await;
            assert_eq!(response["error"]["code"], -32600, "{}", text);
        }
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let d = dispatcher();
        let response = raw(&d, r#"{"jsonrpc":"2.0","method":"tools/delete","id":"a"}"#).await;
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["id"], "a");
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn test_known_method_unsupported_by_handler() {
        let d = dispatcher();
        let response = raw(&d, r#"{"jsonrpc":"2.0","method":"prompts/list","id":2}"#).await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_handler_error_is_internal_error() {
        let d = dispatcher();
        let response = raw(&d, r#"{"jsonrpc":"2.0","method":"tools/call","id":3}"#).await;
        assert_eq!(response["error"]["code"], -32603);
        assert!(response["error"]["message"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_params_are_passed_through() {
        let d = dispatcher();
        let response = raw(
            &d,
            r#"{"jsonrpc":"2.0","method":"tools/list","params":{"cursor":"c"},"id":4}"#,
        )
        .await;
        assert_eq!(response["result"]["cursor"], "c");
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let d = dispatcher();
        assert!(d
            .handle_raw(r#"{"jsonrpc":"2.0","method":"ping"}"#)
            .await
            .is_none());
        assert!(d
            .handle_raw(r#"{"jsonrpc":"2.0","method":"no/such"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_null_id_is_answered() {
        let d = dispatcher();
        let response = raw(&d, r#"{"jsonrpc":"2.0","method":"ping","id":null}"#).await;
        assert!(response["id"].is_null());
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let d = dispatcher();
        assert_eq!(d.state(), SessionState::Uninitialized);

        // Out-of-order calls are still served.
        let response = raw(&d, r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
        assert!(response.get("result").is_some());
        assert_eq!(d.state(), SessionState::Uninitialized);

        raw(&d, r#"{"jsonrpc":"2.0","method":"initialize","id":2}"#).await;
        assert_eq!(d.state(), SessionState::Initialized);

        d.close();
        assert_eq!(d.state(), SessionState::Closed);
        let response = raw(&d, r#"{"jsonrpc":"2.0","method":"ping","id":3}"#).await;
        assert_eq!(response["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn test_route_without_lifecycle() {
        let request = JsonRpcRequest::new(RequestId::Number(9), "ping", None);
        let response = route(&Echo, request).await;
        assert_eq!(response.id, RequestId::Number(9));
        assert_eq!(response.result, Some(json!({})));

        let request = JsonRpcRequest::new(RequestId::Number(10), "bogus", None);
        let response = route(&Echo, request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let metrics = Metrics::new();
        let d = Dispatcher::with_metrics(Arc::new(Echo), metrics.clone());
        raw(&d, r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
        raw(&d, "garbage").await;

        let s = metrics.snapshot();
        assert_eq!(s.requests_total, 2);
        assert_eq!(s.requests_failed, 1);
    }
}
