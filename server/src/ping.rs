//! Connection liveness probing

use duckdb::Connection;
use hyper::{Body, Request, Response, StatusCode};
use tracing::debug;

use duckgate_common::{DuckGateError, QueryResponse, HEADER_CONNECTION_STRING};

use crate::router::{error_response, required_header};

/// Open a connection against the requested database and run a trivial
/// statement. Success is an empty 200; failure carries the error body.
pub async fn handle_ping(req: Request<Body>) -> Response<Body> {
    let dsn = match required_header(&req, HEADER_CONNECTION_STRING) {
        Ok(dsn) => dsn,
        Err(e) => return error_response(&e, &QueryResponse::error(e.to_string())),
    };

    let result = tokio::task::spawn_blocking(move || ping(&dsn)).await;

    match result {
        Ok(Ok(())) => {
            debug!("ping ok");
            Response::builder()
                .status(StatusCode::OK)
                .body(Body::empty())
                .unwrap_or_else(|_| Response::new(Body::empty()))
        }
        Ok(Err(e)) => error_response(&e, &QueryResponse::error(e.to_string())),
        Err(e) => {
            let e = DuckGateError::InternalError(format!("ping task panicked: {e}"));
            error_response(&e, &QueryResponse::error(e.to_string()))
        }
    }
}

pub fn ping(dsn: &str) -> Result<(), DuckGateError> {
    let conn = Connection::open(dsn).map_err(|e| {
        DuckGateError::ConnectionError(format!("failed to open a connection for ping: {e}"))
    })?;
    conn.execute("SELECT 1", []).map_err(|e| {
        DuckGateError::ConnectionError(format!("connection failed the liveness probe: {e}"))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ping_succeeds_on_fresh_database() {
        let dir = TempDir::new().unwrap();
        let dsn = dir.path().join("ping.db").to_string_lossy().into_owned();
        ping(&dsn).unwrap();
    }

    #[test]
    fn test_ping_fails_on_unopenable_path() {
        let err = ping("/nonexistent-dir/nested/ping.db").unwrap_err();
        assert!(matches!(err, DuckGateError::ConnectionError(_)));
    }
}
