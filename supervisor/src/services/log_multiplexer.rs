//! Child output multiplexing
//!
//! Captures stdout/stderr of every managed child and forwards complete lines
//! to one unified sink through a bounded channel. A slow or dead sink never
//! stalls a child: when the channel is full the line is dropped and counted.

use crate::traits::{LogRecord, LogSink, StreamKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Default bound on buffered log lines across all children
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fan-in of child output streams to a single sink
#[derive(Clone)]
pub struct LogMultiplexer {
    tx: mpsc::Sender<LogRecord>,
    dropped: Arc<AtomicU64>,
}

impl LogMultiplexer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_capacity(sink, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(sink: Arc<dyn LogSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<LogRecord>(capacity);

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                sink.write(&record);
            }
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register forwarding for a child's output streams; returns immediately
    pub fn attach<O, E>(&self, service: &str, stdout: Option<O>, stderr: Option<E>)
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        if let Some(stream) = stdout {
            self.spawn_forwarder(service, StreamKind::Stdout, stream);
        }
        if let Some(stream) = stderr {
            self.spawn_forwarder(service, StreamKind::Stderr, stream);
        }
    }

    fn spawn_forwarder<S>(&self, service: &str, kind: StreamKind, stream: S)
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.tx.clone();
        let dropped = Arc::clone(&self.dropped);
        let service = service.to_string();

        tokio::spawn(async move {
            let reader = BufReader::new(stream);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let record = LogRecord {
                    service: service.clone(),
                    stream: kind,
                    line,
                };
                // Full or closed channel: keep draining the child regardless
                if tx.try_send(record).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    /// Lines discarded because the sink could not keep up
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Production sink: re-emits child output through tracing
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, record: &LogRecord) {
        match record.stream {
            StreamKind::Stdout => {
                tracing::info!(service = %record.service, stream = %record.stream, "{}", record.line)
            }
            StreamKind::Stderr => {
                tracing::warn!(service = %record.service, stream = %record.stream, "{}", record.line)
            }
        }
    }
}
