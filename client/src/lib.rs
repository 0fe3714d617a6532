//! HTTP/2 client for a duckgate server
//!
//! Every request rides a prior-knowledge HTTP/2 connection; append bodies
//! stream row by row through [`producer::stream_rows`] while the other
//! operations carry a single JSON payload.

pub mod producer;

use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::mpsc;

use duckgate_common::{
    AppendResponse, DuckGateError, ExecuteRequest, ExecuteResponse, QueryRequest, QueryResponse,
    Statement, APPEND_ROUTE, EXECUTE_ROUTE, HEADER_CONNECTION_STRING, HEADER_DATABASE,
    HEADER_SCHEMA, HEADER_TABLE, PING_ROUTE, QUERY_ROUTE,
};

pub use producer::{json_row_serializer, stream_rows, RowResult};

pub struct Client {
    base_url: String,
    http: hyper::Client<HttpConnector, Body>,
}

impl Client {
    /// Create a client for the given base URL, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = hyper::Client::builder().http2_only(true).build_http();
        Self { base_url, http }
    }

    /// Run a batch of statements inside one transaction and return the summed
    /// affected-row count.
    pub async fn execute(
        &self,
        dsn: &str,
        statements: Vec<Statement>,
    ) -> Result<i64, DuckGateError> {
        let payload = serde_json::to_vec(&ExecuteRequest::new(statements))?;
        let req = self
            .json_request(EXECUTE_ROUTE, dsn)
            .body(Body::from(payload))
            .map_err(build_error)?;
        let resp: ExecuteResponse = self.send(req, "execute").await?;
        match resp.error {
            Some(message) => Err(DuckGateError::RemoteError(message)),
            None => Ok(resp.rows_affected),
        }
    }

    /// Run one query and return its rows as column-keyed mappings.
    pub async fn query(
        &self,
        dsn: &str,
        request: &QueryRequest,
    ) -> Result<Vec<Map<String, JsonValue>>, DuckGateError> {
        let payload = serde_json::to_vec(request)?;
        let req = self
            .json_request(QUERY_ROUTE, dsn)
            .body(Body::from(payload))
            .map_err(build_error)?;
        let resp: QueryResponse = self.send(req, "query").await?;
        match resp.error {
            Some(message) => Err(DuckGateError::RemoteError(message)),
            None => Ok(resp.rows),
        }
    }

    /// Probe that the server can open the target database.
    pub async fn ping(&self, dsn: &str) -> Result<(), DuckGateError> {
        let req = self
            .json_request(PING_ROUTE, dsn)
            .body(Body::empty())
            .map_err(build_error)?;
        let resp = self.http.request(req).await.map_err(|e| {
            DuckGateError::ConnectionError(format!("ping request failed: {e}"))
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let bytes = hyper::body::to_bytes(resp.into_body()).await.map_err(|e| {
            DuckGateError::ConnectionError(format!("failed to read the ping response: {e}"))
        })?;
        let message = serde_json::from_slice::<QueryResponse>(&bytes)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("ping failed with status {status}"));
        Err(DuckGateError::RemoteError(message))
    }

    /// Stream row records into a table until the channel closes, then return
    /// the number of rows the server appended.
    pub async fn append(
        &self,
        dsn: &str,
        database: &str,
        schema: &str,
        table: &str,
        rows: mpsc::Receiver<RowResult>,
    ) -> Result<i64, DuckGateError> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.base_url, APPEND_ROUTE))
            .header(HEADER_CONNECTION_STRING, dsn)
            .header(HEADER_DATABASE, database)
            .header(HEADER_SCHEMA, schema)
            .header(HEADER_TABLE, table)
            .body(producer::stream_rows(rows, producer::json_row_serializer))
            .map_err(build_error)?;
        let resp: AppendResponse = self.send(req, "append").await?;
        match resp.error {
            Some(message) => Err(DuckGateError::RemoteError(message)),
            None => Ok(resp.rows_appended),
        }
    }

    fn json_request(&self, route: &str, dsn: &str) -> hyper::http::request::Builder {
        Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.base_url, route))
            .header(HEADER_CONNECTION_STRING, dsn)
            .header(CONTENT_TYPE, "application/json")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: Request<Body>,
        op: &str,
    ) -> Result<T, DuckGateError> {
        let resp = self
            .http
            .request(req)
            .await
            .map_err(|e| DuckGateError::ConnectionError(format!("{op} request failed: {e}")))?;
        let bytes = hyper::body::to_bytes(resp.into_body()).await.map_err(|e| {
            DuckGateError::ConnectionError(format!("failed to read the {op} response: {e}"))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            DuckGateError::SerializationError(format!("unreadable {op} response: {e}"))
        })
    }
}

fn build_error(err: hyper::http::Error) -> DuckGateError {
    DuckGateError::InternalError(format!("failed to build the request: {err}"))
}
