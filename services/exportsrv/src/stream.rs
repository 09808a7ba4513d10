//! Streaming response bodies
//!
//! CSV is written on a blocking task into a [`ChannelWriter`], which hands
//! fixed-size chunks to the response body over a bounded channel. When the
//! client goes away the receiver is dropped, the next send fails and the
//! writer cancels the export.

use std::io::{self, Write};
use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::csv_export::{write_payload, ExportPayload};
use crate::error::ExportError;
use crate::exception_logger::ExceptionLogger;

/// Chunks in flight between the writer task and the body
const CHANNEL_CAPACITY: usize = 16;

type Chunk = io::Result<Bytes>;

/// Blocking `Write` adapter over an mpsc sender
pub struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
    buf: Vec<u8>,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<Chunk>, chunk_size: usize, cancel: CancellationToken) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            cancel,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
        self.tx.blocking_send(Ok(Bytes::from(chunk))).map_err(|_| {
            self.cancel.cancel();
            io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
        })
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "export cancelled"));
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.chunk_size {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Response body that streams `payload` as CSV
///
/// Failures are reported to `logger`; a failure after the first chunk
/// aborts the body with an error.
pub fn csv_body(
    payload: ExportPayload,
    chunk_size: usize,
    logger: Arc<dyn ExceptionLogger>,
) -> Body {
    let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx.clone(), chunk_size, cancel.clone());
        let Err(err) = write_payload(&payload, writer, &cancel) else {
            return;
        };

        if cancel.is_cancelled() {
            debug!("CSV stream stopped, client disconnected");
            logger.log_exception(&ExportError::Cancelled);
            return;
        }
        logger.log_exception(&err);
        let _ = tx.blocking_send(Err(io::Error::other(err.to_string())));
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Body::from_stream(stream)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::repository::ResultTable;
    use http_body_util::BodyExt;

    #[derive(Default)]
    struct CountingLogger(std::sync::Mutex<Vec<String>>);

    impl ExceptionLogger for CountingLogger {
        fn log_exception(&self, err: &ExportError) {
            self.0.lock().unwrap().push(err.to_string());
        }
    }

    #[tokio::test]
    async fn test_writer_sends_fixed_chunks() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::task::spawn_blocking(move || {
            let mut writer = ChannelWriter::new(tx, 4, CancellationToken::new());
            for part in [b"ab", b"cd", b"ef"] {
                writer.write_all(part).unwrap();
            }
            writer.flush().unwrap();
        });

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap());
        }
        handle.await.unwrap();

        assert_eq!(chunks, vec![Bytes::from("abcd"), Bytes::from("ef")]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let err = tokio::task::spawn_blocking(move || {
            let mut writer = ChannelWriter::new(tx, 2, token);
            writer.write_all(b"abcd").unwrap_err()
        })
        .await
        .unwrap();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_csv_body_streams_table() {
        let table = ResultTable {
            columns: vec!["A".into(), "B".into()],
            rows: vec![vec![Some("1".into()), Some("2".into())]; 100],
        };
        let logger = Arc::new(CountingLogger::default());
        let body = csv_body(ExportPayload::Stats(table), 16, logger.clone());

        let bytes = body.collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 101);
        assert!(text.starts_with("A,B\r\n1,2\r\n"));
        assert!(logger.0.lock().unwrap().is_empty());
    }
}
