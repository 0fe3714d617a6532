//! Row producer for append streams
//!
//! Bridges a channel of row results onto a streaming request body. Each
//! record becomes exactly one newline-terminated frame, so the server never
//! sees a partially-written record. Closing the channel ends the body
//! cleanly; an error sentinel or a record that fails to serialize aborts the
//! stream instead, which the server treats as an incomplete session.

use bytes::Bytes;
use hyper::Body;
use tokio::sync::mpsc;
use tracing::warn;

use duckgate_common::{DuckGateError, RowMessage};

/// One item on the producer channel: a row to upload, or an error sentinel
/// that terminates the stream.
pub type RowResult = Result<RowMessage, DuckGateError>;

/// Newline-terminated JSON encoding, the wire's default.
pub fn json_row_serializer(row: &RowMessage) -> Result<Vec<u8>, DuckGateError> {
    Ok(serde_json::to_vec(row)?)
}

/// Turn a receiver of row results into a request body using the given row
/// serialization function. Frame order on the wire equals channel order.
pub fn stream_rows<F>(mut rows: mpsc::Receiver<RowResult>, serialize: F) -> Body
where
    F: Fn(&RowMessage) -> Result<Vec<u8>, DuckGateError> + Send + 'static,
{
    let (mut sender, body) = Body::channel();

    tokio::spawn(async move {
        while let Some(item) = rows.recv().await {
            let frame = match item.and_then(|row| encode_line(&row, &serialize)) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("aborting append stream: {e}");
                    sender.abort();
                    return;
                }
            };
            // send_data applies flow-control backpressure to the producer
            if sender.send_data(frame).await.is_err() {
                return;
            }
        }
        // Dropping the sender ends the body cleanly.
    });

    body
}

fn encode_line<F>(row: &RowMessage, serialize: &F) -> Result<Bytes, DuckGateError>
where
    F: Fn(&RowMessage) -> Result<Vec<u8>, DuckGateError>,
{
    let mut line = serialize(row)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckgate_common::CellValue;

    #[tokio::test]
    async fn test_rows_become_ordered_newline_frames() {
        let (tx, rx) = mpsc::channel(4);
        let body = stream_rows(rx, json_row_serializer);

        tx.send(Ok(RowMessage::new(vec![CellValue::Integer(1)])))
            .await
            .unwrap();
        tx.send(Ok(RowMessage::new(vec![
            CellValue::Text("x".to_string()),
            CellValue::Null,
        ])))
        .await
        .unwrap();
        drop(tx);

        let bytes = hyper::body::to_bytes(body).await.unwrap();
        assert_eq!(&bytes[..], &b"{\"rv\":[1]}\n{\"rv\":[\"x\",null]}\n"[..]);
    }

    #[tokio::test]
    async fn test_error_sentinel_aborts_the_body() {
        let (tx, rx) = mpsc::channel(4);
        let body = stream_rows(rx, json_row_serializer);

        tx.send(Ok(RowMessage::new(vec![CellValue::Integer(1)])))
            .await
            .unwrap();
        tx.send(Err(DuckGateError::InternalError("source failed".to_string())))
            .await
            .unwrap();
        drop(tx);

        // The aborted body surfaces as a read error, not a clean end.
        assert!(hyper::body::to_bytes(body).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_ends_body_empty() {
        let (tx, rx) = mpsc::channel::<RowResult>(1);
        drop(tx);
        let bytes = hyper::body::to_bytes(stream_rows(rx, json_row_serializer))
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }
}
