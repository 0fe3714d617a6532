//! Request routing and shared response plumbing

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use duckgate_common::{
    DuckGateError, ServerConfig, APPEND_ROUTE, EXECUTE_ROUTE, HEALTH_ROUTE, PING_ROUTE,
    QUERY_ROUTE,
};

use crate::{append, execute, ping, query};

/// Dispatch one request to its handler.
pub async fn route(req: Request<Body>, config: Arc<ServerConfig>) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, EXECUTE_ROUTE) => execute::handle_execute(req).await,
        (&Method::POST, QUERY_ROUTE) => query::handle_query(req).await,
        (&Method::POST, APPEND_ROUTE) => append::handle_append(req, config).await,
        (&Method::POST, PING_ROUTE) => ping::handle_ping(req).await,
        (&Method::GET, HEALTH_ROUTE) => Response::new(Body::from("OK")),
        _ => {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    }
}

/// Serialize a structured payload with the given status. Falls back to a
/// minimal hand-built body if serialization itself fails, so the caller never
/// sees a bare transport error.
pub(crate) fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Body> {
    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(e) => {
            error!("failed to serialize response body: {}", e);
            format!("{{\"error\":\"failed to serialize response: {e}\"}}").into_bytes()
        }
    };

    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Map a failure to its response: protocol errors are the caller's fault,
/// everything else is a server-side failure.
pub(crate) fn error_response<T: Serialize>(err: &DuckGateError, payload: &T) -> Response<Body> {
    let status = if err.is_protocol_error() {
        error!("returning bad request: {}", err);
        StatusCode::BAD_REQUEST
    } else {
        error!("returning internal server error: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    json_response(status, payload)
}

/// Fetch a required header, or fail with a protocol error before any session
/// state is created.
pub(crate) fn required_header(req: &Request<Body>, name: &str) -> Result<String, DuckGateError> {
    match req.headers().get(name).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(DuckGateError::ProtocolError(format!(
            "{name:?} header is required"
        ))),
    }
}

/// Fetch an optional header with a default.
pub(crate) fn header_or(req: &Request<Body>, name: &str, default: &str) -> String {
    match req.headers().get(name).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default.to_string(),
    }
}

/// Buffer and decode a JSON request body. Execute and query bodies are small;
/// only append streams.
pub(crate) async fn read_json_body<T: DeserializeOwned>(
    req: Request<Body>,
) -> Result<T, DuckGateError> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| DuckGateError::ProtocolError(format!("failed to read the request body: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DuckGateError::ProtocolError(format!("failed to decode the request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckgate_common::QueryResponse;

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = route(req, Arc::new(ServerConfig::default())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_route() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = route(req, Arc::new(ServerConfig::default())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], &b"OK"[..]);
    }

    #[test]
    fn test_required_header_missing_is_protocol_error() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let err = required_header(&req, "x-duckdb-connection-string").unwrap_err();
        assert!(err.is_protocol_error());
        assert!(err.to_string().contains("x-duckdb-connection-string"));
    }

    #[test]
    fn test_error_response_status_split() {
        let protocol = DuckGateError::ProtocolError("missing header".to_string());
        let resp = error_response(&protocol, &QueryResponse::error("missing header"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let engine = DuckGateError::EngineError("boom".to_string());
        let resp = error_response(&engine, &QueryResponse::error("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
