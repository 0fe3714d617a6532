//! Atomic statement-batch execution
//!
//! All statements in a batch run inside one transaction: they commit together
//! or the whole batch rolls back on the first failing statement, with no
//! partially visible intermediate state. This is deliberately stronger than
//! the append path, which has no compensating rollback.

use duckdb::{params_from_iter, Connection};
use hyper::{Body, Request, Response, StatusCode};
use std::time::Instant;
use tracing::{debug, instrument};

use duckgate_common::{
    coerce::engine_value_from_json, DuckGateError, ExecuteRequest, ExecuteResponse,
    HEADER_CONNECTION_STRING,
};

use crate::router::{error_response, json_response, read_json_body, required_header};

pub async fn handle_execute(req: Request<Body>) -> Response<Body> {
    let start = Instant::now();

    let dsn = match required_header(&req, HEADER_CONNECTION_STRING) {
        Ok(dsn) => dsn,
        Err(e) => return error_response(&e, &ExecuteResponse::error(e.to_string())),
    };

    let request: ExecuteRequest = match read_json_body(req).await {
        Ok(request) => request,
        Err(e) => return error_response(&e, &ExecuteResponse::error(e.to_string())),
    };

    let result = tokio::task::spawn_blocking(move || execute_batch(&dsn, &request)).await;

    let rows_affected = match result {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => return error_response(&e, &ExecuteResponse::error(e.to_string())),
        Err(e) => {
            let e = DuckGateError::InternalError(format!("execute task panicked: {e}"));
            return error_response(&e, &ExecuteResponse::error(e.to_string()));
        }
    };

    debug!(
        "execute complete: {} rows affected in {:?}",
        rows_affected,
        start.elapsed()
    );
    json_response(StatusCode::OK, &ExecuteResponse::success(rows_affected))
}

/// Run a statement batch inside one transaction and return the total rows
/// affected. Dropping the transaction without commit rolls everything back.
#[instrument(skip(dsn, request), fields(statements = request.statements.len()))]
pub fn execute_batch(dsn: &str, request: &ExecuteRequest) -> Result<i64, DuckGateError> {
    if request.statements.is_empty() {
        return Err(DuckGateError::ProtocolError(
            "at least one statement is required".to_string(),
        ));
    }

    let mut conn = Connection::open(dsn).map_err(|e| {
        DuckGateError::ConnectionError(format!("failed to open a connection for execute: {e}"))
    })?;
    conn.execute("SELECT 1", []).map_err(|e| {
        DuckGateError::ConnectionError(format!("failed to validate the connection for execute: {e}"))
    })?;

    let tx = conn.transaction().map_err(|e| {
        DuckGateError::TransactionError(format!("failed to begin a transaction: {e}"))
    })?;

    let mut total_rows_affected = 0i64;
    for statement in &request.statements {
        debug!("executing statement: {}", statement.query);

        let args = statement
            .args
            .iter()
            .map(engine_value_from_json)
            .collect::<Result<Vec<_>, _>>()?;

        let rows_affected = tx
            .execute(&statement.query, params_from_iter(args))
            .map_err(|e| {
                DuckGateError::TransactionError(format!("failed to execute the statement: {e}"))
            })?;
        total_rows_affected += rows_affected as i64;
    }

    tx.commit().map_err(|e| {
        DuckGateError::TransactionError(format!("failed to commit the transaction: {e}"))
    })?;

    Ok(total_rows_affected)
}
