//! Append-only JSONL recorder for completed requests.
//!
//! Records flow through a bounded queue into a single writer task, so the
//! sink sees them in arrival order and request handlers never hold the file
//! open. One JSON object per line, atomic per record.

use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncWriteExt as _, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queue depth; `record` waits for a slot when the writer falls behind.
const QUEUE_CAPACITY: usize = 64;

/// Records between forced flushes when the queue never drains.
const FLUSH_EVERY: usize = 32;

#[derive(Debug, Error)]
pub enum RecordError {
    /// The sink was shut down; the record was dropped.
    #[error("the snapshot sink is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unsupported snapshot sink '{0}': only the jsonl: scheme is supported")]
    UnsupportedScheme(String),

    #[error("failed to open snapshot sink: {0}")]
    Io(#[from] std::io::Error),
}

/// One archived request/response exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub request_time: Timestamp,
    pub finish_time: Timestamp,
    pub version: String,
    pub request_id: u64,
    pub status_code: u16,
    pub provider: String,
    pub profile: String,

    /// Redacted profile configuration in effect for this request.
    pub config: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    pub anthropic_request: Value,
    pub anthropic_response: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter_request: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter_response: Option<Value>,

    pub request_header: Value,
    pub response_header: Value,
}

/// Handle for enqueueing records; cheap to clone.
#[derive(Debug, Clone)]
pub struct Recorder {
    tx: mpsc::Sender<Record>,
}

impl Recorder {
    /// Enqueues a record, waiting for queue capacity.
    pub async fn record(&self, record: Record) -> Result<(), RecordError> {
        self.tx.send(record).await.map_err(|_| RecordError::Closed)
    }
}

/// Parses a `jsonl:<path>` sink URI.
pub fn parse_sink_uri(uri: &str) -> Result<PathBuf, SinkError> {
    uri.strip_prefix("jsonl:")
        .map(PathBuf::from)
        .ok_or_else(|| SinkError::UnsupportedScheme(uri.to_string()))
}

/// Opens the sink and starts the writer task.
///
/// The task ends once every [`Recorder`] clone is dropped; await the handle
/// during shutdown to be sure the tail of the file is flushed.
pub async fn spawn<P: AsRef<Path>>(path: P) -> Result<(Recorder, JoinHandle<()>), SinkError> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .await?;

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(write_records(BufWriter::new(file), rx));

    Ok((Recorder { tx }, handle))
}

async fn write_records(mut writer: BufWriter<tokio::fs::File>, mut rx: mpsc::Receiver<Record>) {
    let mut since_flush = 0usize;

    while let Some(record) = rx.recv().await {
        match serde_json::to_vec(&record) {
            Ok(mut line) => {
                line.push(b'\n');
                if let Err(err) = writer.write_all(&line).await {
                    log::error!("failed to append snapshot record: {err}");
                }
            }
            Err(err) => log::warn!("failed to serialize snapshot record: {err}"),
        }

        since_flush += 1;
        if since_flush >= FLUSH_EVERY || rx.is_empty() {
            if let Err(err) = writer.flush().await {
                log::error!("failed to flush snapshot sink: {err}");
            }
            since_flush = 0;
        }
    }

    if let Err(err) = writer.flush().await {
        log::error!("failed to flush snapshot sink on shutdown: {err}");
    }
}

/// Collapses an HTTP header map for archival: single-value headers become
/// scalar strings, repeated headers become arrays, empty values are omitted.
pub fn collapse_headers(headers: &http::HeaderMap) -> Value {
    let mut out = serde_json::Map::new();

    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();

        match values.len() {
            0 => {}
            1 => {
                out.insert(name.as_str().to_string(), Value::String(values.into_iter().next().unwrap_or_default()));
            }
            _ => {
                out.insert(name.as_str().to_string(), Value::Array(values.into_iter().map(Value::String).collect()));
            }
        }
    }

    Value::Object(out)
}
