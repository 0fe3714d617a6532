//! Streaming bulk append
//!
//! The request body is newline-delimited JSON row records arriving over a
//! single HTTP/2 stream. The handler splits the body into lines and feeds
//! them over a bounded channel to a blocking session that owns the database
//! connection and its appender, so memory stays bounded regardless of how
//! long the stream runs. An explicit end-of-stream frame separates a clean
//! finish from a dropped client: only a clean finish gets the final flush.

use bytes::{Bytes, BytesMut};
use duckdb::{appender_params_from_iter, Connection};
use futures::StreamExt;
use hyper::{Body, Request, Response, StatusCode, Version};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use duckgate_common::{
    coerce::coerce_value, metadata::resolve_column_metadata, AppendResponse, DuckGateError,
    RowMessage, ServerConfig, DEFAULT_SCHEMA, HEADER_CONNECTION_STRING, HEADER_DATABASE,
    HEADER_SCHEMA, HEADER_TABLE,
};

use crate::router::{error_response, header_or, json_response, required_header};

/// When buffered rows are handed to the engine.
///
/// The byte ceiling matters because the engine caps a single appender flush
/// at 4MB; row counts alone cannot guarantee staying under it.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub row_interval: i64,
    pub bytes_limit: u64,
}

impl FlushPolicy {
    pub fn should_flush(&self, rows_appended: i64, bytes_since_flush: u64) -> bool {
        (self.row_interval > 0 && rows_appended % self.row_interval == 0)
            || bytes_since_flush >= self.bytes_limit
    }
}

/// One frame on the line channel. `End` marks a cleanly-finished body; a
/// channel that closes without it means the client went away mid-stream.
pub(crate) enum LineFrame {
    Line(Bytes),
    End,
}

pub(crate) struct AppendTarget {
    pub dsn: String,
    pub database: String,
    pub schema: String,
    pub table: String,
}

pub async fn handle_append(req: Request<Body>, config: Arc<ServerConfig>) -> Response<Body> {
    if req.version() != Version::HTTP_2 {
        let e = DuckGateError::ProtocolError(
            "append requires an HTTP/2 request stream".to_string(),
        );
        return error_response(&e, &AppendResponse::error(e.to_string()));
    }

    let target = match append_target(&req) {
        Ok(target) => target,
        Err(e) => return error_response(&e, &AppendResponse::error(e.to_string())),
    };

    let session_id = Uuid::new_v4();
    info!(
        %session_id,
        database = %target.database,
        schema = %target.schema,
        table = %target.table,
        "append session started"
    );

    let policy = FlushPolicy {
        row_interval: config.flush_row_interval,
        bytes_limit: config.flush_bytes_limit,
    };
    let (tx, rx) = mpsc::channel(config.line_channel_capacity);

    // The connection is not Send; the session owns it on a blocking thread
    // while the async side only reads the body.
    let worker = tokio::task::spawn_blocking(move || run_append_session(&target, policy, rx));

    let feed_result = feed_lines(req.into_body(), tx, config.flush_bytes_limit).await;
    let session_result = match worker.await {
        Ok(result) => result,
        Err(e) => Err(DuckGateError::InternalError(format!(
            "append session panicked: {e}"
        ))),
    };

    let (rows_appended, bytes_read) = match (session_result, feed_result) {
        (Ok(counts), Ok(())) => counts,
        (Err(e), Ok(())) | (Ok(_), Err(e)) => {
            return error_response(&e, &AppendResponse::error(e.to_string()))
        }
        (Err(session_err), Err(feed_err)) => {
            // A dead session also fails the feed with a send error; any other
            // feed failure is the root cause.
            let root = if matches!(feed_err, DuckGateError::InternalError(_)) {
                session_err
            } else {
                feed_err
            };
            return error_response(&root, &AppendResponse::error(root.to_string()));
        }
    };

    info!(%session_id, rows_appended, bytes_read, "append session complete");
    json_response(StatusCode::OK, &AppendResponse::success(rows_appended))
}

fn append_target(req: &Request<Body>) -> Result<AppendTarget, DuckGateError> {
    Ok(AppendTarget {
        dsn: required_header(req, HEADER_CONNECTION_STRING)?,
        database: required_header(req, HEADER_DATABASE)?,
        schema: header_or(req, HEADER_SCHEMA, DEFAULT_SCHEMA),
        table: required_header(req, HEADER_TABLE)?,
    })
}

/// Split body chunks into newline-terminated frames and forward them.
///
/// A single line may not exceed `max_line_bytes` before its delimiter
/// arrives; without that ceiling a delimiter-free body would accumulate
/// unbounded in the pending buffer, since the channel only bounds framed
/// lines.
async fn feed_lines(
    mut body: Body,
    tx: mpsc::Sender<LineFrame>,
    max_line_bytes: u64,
) -> Result<(), DuckGateError> {
    let mut buffer = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            DuckGateError::ProtocolError(format!("failed to read the request body: {e}"))
        })?;
        buffer.extend_from_slice(&chunk);

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line = buffer.split_to(pos + 1).freeze();
            if tx.send(LineFrame::Line(line)).await.is_err() {
                return Err(session_gone());
            }
        }

        if buffer.len() as u64 > max_line_bytes {
            return Err(DuckGateError::MalformedInputError(format!(
                "line exceeds {max_line_bytes} bytes without a delimiter"
            )));
        }
    }

    // Trailing line without a newline terminator
    if !buffer.is_empty() && tx.send(LineFrame::Line(buffer.freeze())).await.is_err() {
        return Err(session_gone());
    }
    if tx.send(LineFrame::End).await.is_err() {
        return Err(session_gone());
    }

    Ok(())
}

fn session_gone() -> DuckGateError {
    DuckGateError::InternalError("append session ended before the body was consumed".to_string())
}

/// Consume line frames until the end-of-stream frame, appending each record.
/// Returns the appended row count and the payload bytes of the non-blank
/// records consumed.
///
/// Resolves column metadata once, before the first row; the snapshot holds
/// for the whole session. The final flush happens only after the `End` frame;
/// if the channel closes without one the session errors instead, though the
/// appender may still hand its buffered rows to the engine when it is
/// released.
pub(crate) fn run_append_session(
    target: &AppendTarget,
    policy: FlushPolicy,
    mut lines: mpsc::Receiver<LineFrame>,
) -> Result<(i64, u64), DuckGateError> {
    let conn = Connection::open(&target.dsn).map_err(|e| {
        DuckGateError::ConnectionError(format!("failed to open a connection for append: {e}"))
    })?;
    conn.execute("SELECT 1", []).map_err(|e| {
        DuckGateError::ConnectionError(format!(
            "failed to validate the connection for append: {e}"
        ))
    })?;

    let columns =
        resolve_column_metadata(&conn, &target.database, &target.schema, &target.table)?;
    if columns.is_empty() {
        return Err(DuckGateError::SchemaMismatchError(format!(
            "no columns found for {}.{}.{}",
            target.database, target.schema, target.table
        )));
    }

    let mut appender = conn
        .appender_to_db(&target.table, &target.schema)
        .map_err(|e| {
            DuckGateError::EngineError(format!(
                "failed to open an appender on {}.{}: {e}",
                target.schema, target.table
            ))
        })?;

    let mut rows_appended: i64 = 0;
    let mut bytes_read: u64 = 0;
    let mut bytes_since_flush: u64 = 0;
    let mut lines_seen: u64 = 0;
    let mut finished = false;

    while let Some(frame) = lines.blocking_recv() {
        let line = match frame {
            LineFrame::Line(line) => line,
            LineFrame::End => {
                finished = true;
                break;
            }
        };
        lines_seen += 1;

        let record = trim_line(&line);
        if record.is_empty() {
            continue;
        }
        bytes_read += record.len() as u64;

        let row: RowMessage = serde_json::from_slice(record).map_err(|e| {
            DuckGateError::MalformedInputError(format!(
                "failed to decode line {lines_seen}: {e}"
            ))
        })?;

        let mut values = Vec::with_capacity(row.values.len());
        for (index, cell) in row.values.into_iter().enumerate() {
            values.push(coerce_value(cell, index, &columns)?);
        }

        appender
            .append_row(appender_params_from_iter(values))
            .map_err(|e| {
                DuckGateError::EngineError(format!("failed to append line {lines_seen}: {e}"))
            })?;
        rows_appended += 1;
        bytes_since_flush += line.len() as u64;

        if policy.should_flush(rows_appended, bytes_since_flush) {
            appender.flush().map_err(|e| {
                DuckGateError::EngineError(format!(
                    "failed to flush after {rows_appended} rows: {e}"
                ))
            })?;
            debug!(rows_appended, bytes_since_flush, "intermediate flush");
            bytes_since_flush = 0;
        }
    }

    if !finished {
        return Err(DuckGateError::ProtocolError(
            "request stream ended before completion".to_string(),
        ));
    }

    appender.flush().map_err(|e| {
        DuckGateError::EngineError(format!("failed the final flush after {rows_appended} rows: {e}"))
    })?;

    Ok((rows_appended, bytes_read))
}

fn trim_line(mut line: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = line {
        if !first.is_ascii_whitespace() {
            break;
        }
        line = rest;
    }
    while let [rest @ .., last] = line {
        if !last.is_ascii_whitespace() {
            break;
        }
        line = rest;
    }
    line
}
