//! Single-statement querying with column-keyed row mappings

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value as EngineValue};
use duckdb::{params_from_iter, Connection};
use hyper::{Body, Request, Response, StatusCode};
use serde_json::{Map, Number, Value as JsonValue};
use std::time::Instant;
use tracing::{debug, instrument};

use duckgate_common::{
    coerce::engine_value_from_json, DuckGateError, QueryRequest, QueryResponse,
    HEADER_CONNECTION_STRING,
};

use crate::router::{error_response, json_response, read_json_body, required_header};

pub async fn handle_query(req: Request<Body>) -> Response<Body> {
    let start = Instant::now();

    let dsn = match required_header(&req, HEADER_CONNECTION_STRING) {
        Ok(dsn) => dsn,
        Err(e) => return error_response(&e, &QueryResponse::error(e.to_string())),
    };

    let request: QueryRequest = match read_json_body(req).await {
        Ok(request) => request,
        Err(e) => return error_response(&e, &QueryResponse::error(e.to_string())),
    };

    let result = tokio::task::spawn_blocking(move || run_query(&dsn, &request)).await;

    let rows = match result {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => return error_response(&e, &QueryResponse::error(e.to_string())),
        Err(e) => {
            let e = DuckGateError::InternalError(format!("query task panicked: {e}"));
            return error_response(&e, &QueryResponse::error(e.to_string()));
        }
    };

    debug!(
        "query complete: {} rows in {:?}",
        rows.len(),
        start.elapsed()
    );
    json_response(StatusCode::OK, &QueryResponse::success(rows))
}

/// Execute one statement on a short-lived connection and map every result row
/// to a column-keyed JSON object, in cursor order.
#[instrument(skip(dsn, request), fields(query_len = request.query.len()))]
pub fn run_query(
    dsn: &str,
    request: &QueryRequest,
) -> Result<Vec<Map<String, JsonValue>>, DuckGateError> {
    let conn = Connection::open(dsn).map_err(|e| {
        DuckGateError::ConnectionError(format!("failed to open a connection for query: {e}"))
    })?;
    conn.execute("SELECT 1", []).map_err(|e| {
        DuckGateError::ConnectionError(format!("failed to validate the connection for query: {e}"))
    })?;

    debug!("querying: {}", request.query);

    let args = request
        .args
        .iter()
        .map(engine_value_from_json)
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&request.query)?;
    let mut rows = stmt.query(params_from_iter(args))?;

    let names: Vec<String> = match rows.as_ref() {
        Some(stmt) => stmt.column_names().iter().map(|name| name.to_string()).collect(),
        None => {
            return Err(DuckGateError::InternalError(
                "statement handle unavailable after query".to_string(),
            ))
        }
    };

    let mut objects = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let value: EngineValue = row.get(index)?;
            object.insert(name.clone(), engine_value_to_json(value));
        }
        objects.push(object);
    }

    Ok(objects)
}

/// Render an engine value as JSON. Temporal values become ISO-8601 text;
/// anything without a natural JSON shape falls back to its display form.
fn engine_value_to_json(value: EngineValue) -> JsonValue {
    match value {
        EngineValue::Null => JsonValue::Null,
        EngineValue::Boolean(v) => JsonValue::Bool(v),
        EngineValue::TinyInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::SmallInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::Int(v) => JsonValue::Number(Number::from(v)),
        EngineValue::BigInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::HugeInt(v) => match i64::try_from(v) {
            Ok(v) => JsonValue::Number(Number::from(v)),
            Err(_) => JsonValue::String(v.to_string()),
        },
        EngineValue::UTinyInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::USmallInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::UInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::UBigInt(v) => JsonValue::Number(Number::from(v)),
        EngineValue::Float(v) => Number::from_f64(f64::from(v))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        EngineValue::Double(v) => Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        EngineValue::Text(v) => JsonValue::String(v),
        EngineValue::Blob(v) => JsonValue::Array(
            v.into_iter()
                .map(|byte| JsonValue::Number(Number::from(byte)))
                .collect(),
        ),
        EngineValue::Date32(days) => {
            let date = NaiveDate::default() + chrono::Duration::days(i64::from(days));
            JsonValue::String(date.format("%Y-%m-%d").to_string())
        }
        EngineValue::Timestamp(unit, v) => match DateTime::from_timestamp_micros(to_micros(unit, v))
        {
            Some(dt) => JsonValue::String(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            None => JsonValue::Null,
        },
        EngineValue::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            let seconds = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1_000) as u32;
            match NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos) {
                Some(time) => JsonValue::String(time.format("%H:%M:%S%.6f").to_string()),
                None => JsonValue::Null,
            }
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dsn(dir: &TempDir) -> String {
        dir.path().join("query.db").to_string_lossy().into_owned()
    }

    #[test]
    fn test_rows_keyed_by_column_in_cursor_order() {
        let dir = TempDir::new().unwrap();
        {
            let conn = Connection::open(dsn(&dir)).unwrap();
            conn.execute_batch(
                "CREATE TABLE t (id BIGINT, name VARCHAR);
                 INSERT INTO t VALUES (2, 'b'), (1, 'a');",
            )
            .unwrap();
        }

        let rows = run_query(
            &dsn(&dir),
            &QueryRequest::new("SELECT id, name FROM t ORDER BY id"),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], serde_json::json!(1));
        assert_eq!(rows[0]["name"], serde_json::json!("a"));
        assert_eq!(rows[1]["id"], serde_json::json!(2));
    }

    #[test]
    fn test_args_bind_and_filter() {
        let dir = TempDir::new().unwrap();
        {
            let conn = Connection::open(dsn(&dir)).unwrap();
            conn.execute_batch(
                "CREATE TABLE t (id BIGINT, name VARCHAR);
                 INSERT INTO t VALUES (1, 'a'), (2, 'b');",
            )
            .unwrap();
        }

        let request = QueryRequest::new("SELECT name FROM t WHERE id = ?")
            .with_args(vec![serde_json::json!(2)]);
        let rows = run_query(&dsn(&dir), &request).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], serde_json::json!("b"));
    }

    #[test]
    fn test_temporal_values_render_as_text() {
        let dir = TempDir::new().unwrap();
        {
            let conn = Connection::open(dsn(&dir)).unwrap();
            conn.execute_batch(
                "CREATE TABLE t (d DATE, ts TIMESTAMP);
                 INSERT INTO t VALUES (DATE '2024-03-15', TIMESTAMP '2024-03-15 14:30:00');",
            )
            .unwrap();
        }

        let rows = run_query(&dsn(&dir), &QueryRequest::new("SELECT d, ts FROM t")).unwrap();
        assert_eq!(rows[0]["d"], serde_json::json!("2024-03-15"));
        assert_eq!(
            rows[0]["ts"],
            serde_json::json!("2024-03-15 14:30:00.000000")
        );
    }

    #[test]
    fn test_invalid_sql_is_engine_error() {
        let dir = TempDir::new().unwrap();
        let err = run_query(&dsn(&dir), &QueryRequest::new("NOT SQL")).unwrap_err();
        assert!(matches!(err, DuckGateError::EngineError(_)));
    }

    #[test]
    fn test_empty_result_is_empty_rows() {
        let dir = TempDir::new().unwrap();
        {
            let conn = Connection::open(dsn(&dir)).unwrap();
            conn.execute_batch("CREATE TABLE t (id BIGINT)").unwrap();
        }
        let rows = run_query(&dsn(&dir), &QueryRequest::new("SELECT * FROM t")).unwrap();
        assert!(rows.is_empty());
    }
}
