//! Append-only audit trail of admission decisions.
//!
//! # Responsibilities
//! - Accept records from the request path without blocking it
//! - Persist them as JSON lines on a background writer task
//! - Read recent records back for the admin log viewer
//!
//! # Design Decisions
//! - `append` never fails or waits; a full queue drops the record and
//!   counts it, write errors are logged and dropped
//! - The writer reopens the file after an I/O error instead of giving up
//! - Reads walk the file backwards in fixed chunks and stop at `limit`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::observability::metrics;
use crate::security::headers::ClientAddress;

const WRITE_BATCH: usize = 256;
const READ_CHUNK: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Admitted,
    Rejected { status: u16 },
    Terminated { reason: String },
    /// The request that pushed its client over the ban threshold.
    Banned { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub client: ClientAddress,
    pub outcome: Outcome,
}

impl AccessRecord {
    pub fn now(method: impl Into<String>, path: impl Into<String>, client: ClientAddress, outcome: Outcome) -> Self {
        Self {
            timestamp: Utc::now(),
            method: method.into(),
            path: path.into(),
            client,
            outcome,
        }
    }
}

/// Destination for access records. Implementations must not block.
pub trait AccessSink: Send + Sync {
    fn append(&self, record: AccessRecord);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAccessLog;

impl AccessSink for NoopAccessLog {
    fn append(&self, _record: AccessRecord) {}
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAccessLog {
    records: Mutex<Vec<AccessRecord>>,
}

impl MemoryAccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AccessRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AccessSink for MemoryAccessLog {
    fn append(&self, record: AccessRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

/// JSON-lines file log fed through a bounded channel.
#[derive(Debug, Clone)]
pub struct FileAccessLog {
    tx: mpsc::Sender<AccessRecord>,
    path: PathBuf,
}

impl FileAccessLog {
    /// Start the writer task. Must be called inside a Tokio runtime.
    /// `capacity` is clamped to at least one record.
    pub fn spawn(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(write_loop(path.clone(), rx));
        Self { tx, path }
    }
}

impl AccessSink for FileAccessLog {
    fn append(&self, record: AccessRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::record_access_log_dropped();
                tracing::debug!(path = %self.path.display(), "Access log queue full, record dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!(path = %self.path.display(), "Access log writer has stopped");
            }
        }
    }
}

async fn open_log(path: &Path) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_batch(writer: &mut BufWriter<File>, batch: &[AccessRecord]) -> io::Result<()> {
    for record in batch {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }
    writer.flush().await
}

async fn write_loop(path: PathBuf, mut rx: mpsc::Receiver<AccessRecord>) {
    let mut writer: Option<BufWriter<File>> = None;
    let mut batch = Vec::with_capacity(WRITE_BATCH);

    while rx.recv_many(&mut batch, WRITE_BATCH).await > 0 {
        if writer.is_none() {
            match open_log(&path).await {
                Ok(w) => writer = Some(w),
                Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to open access log"),
            }
        }

        if let Some(w) = writer.as_mut() {
            if let Err(e) = write_batch(w, &batch).await {
                tracing::error!(path = %path.display(), error = %e, "Failed to write access log");
                writer = None;
            }
        }
        batch.clear();
    }

    tracing::debug!(path = %path.display(), "Access log writer stopped");
}

/// Which records the log viewer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFilter {
    #[default]
    All,
    /// Terminated requests.
    Blocked,
    /// Ban transitions.
    Banned,
}

impl LogFilter {
    pub fn matches(&self, record: &AccessRecord) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Blocked => matches!(record.outcome, Outcome::Terminated { .. }),
            LogFilter::Banned => matches!(record.outcome, Outcome::Banned { .. }),
        }
    }
}

/// Newest-first records from a JSON-lines log. Unparseable lines are skipped
/// and a missing file reads as empty.
pub async fn read_recent(path: &Path, filter: LogFilter, limit: usize) -> io::Result<Vec<AccessRecord>> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    let mut pos = file.metadata().await?.len();
    // Bytes of a line whose start lies before `pos`.
    let mut partial: Vec<u8> = Vec::new();

    while pos > 0 && records.len() < limit {
        let start = pos.saturating_sub(READ_CHUNK);
        let mut chunk = vec![0u8; (pos - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&partial);
        pos = start;

        let mut lines = chunk.split(|b| *b == b'\n');
        // The first piece may continue into the previous chunk.
        let head = if pos > 0 { lines.next().unwrap_or_default().to_vec() } else { Vec::new() };

        for line in lines.rev() {
            if records.len() == limit {
                break;
            }
            if let Ok(record) = serde_json::from_slice::<AccessRecord>(line) {
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        }
        partial = head;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(path: &str, outcome: Outcome) -> AccessRecord {
        AccessRecord::now("GET", path, ClientAddress::from("10.1.1.1"), outcome)
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(record(
            "/wp-admin",
            Outcome::Terminated {
                reason: "denylisted:probe_path".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(json["client"], "10.1.1.1");
        assert_eq!(json["outcome"]["kind"], "terminated");
        assert_eq!(json["outcome"]["reason"], "denylisted:probe_path");
    }

    #[test]
    fn test_memory_log_collects() {
        let log = MemoryAccessLog::new();
        log.append(record("/", Outcome::Admitted));
        log.append(record("/nope", Outcome::Rejected { status: 404 }));
        assert_eq!(log.records().len(), 2);
    }

    #[tokio::test]
    async fn test_file_log_round_trip_with_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("access.log");
        let log = FileAccessLog::spawn(&path, 64);

        log.append(record("/", Outcome::Admitted));
        log.append(record(
            "/.git/config",
            Outcome::Terminated {
                reason: "denylisted:blocked_file".to_string(),
            },
        ));
        log.append(record(
            "/wp-admin",
            Outcome::Banned {
                reason: "Multiple suspicious requests".to_string(),
            },
        ));

        let mut all = Vec::new();
        for _ in 0..50 {
            all = read_recent(&path, LogFilter::All, 100).await.unwrap();
            if all.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].path, "/wp-admin");

        let blocked = read_recent(&path, LogFilter::Blocked, 100).await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].path, "/.git/config");

        let banned = read_recent(&path, LogFilter::Banned, 100).await.unwrap();
        assert_eq!(banned.len(), 1);

        let limited = read_recent(&path, LogFilter::All, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_read_recent_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");

        let mut contents = Vec::new();
        let first = record(
            "/phpmyadmin",
            Outcome::Banned {
                reason: "Multiple suspicious requests".to_string(),
            },
        );
        contents.extend(serde_json::to_vec(&first).unwrap());
        contents.push(b'\n');
        for i in 0..2000 {
            contents.extend(serde_json::to_vec(&record(&format!("/page/{i}"), Outcome::Admitted)).unwrap());
            contents.push(b'\n');
        }
        assert!(contents.len() as u64 > READ_CHUNK * 2);
        fs::write(&path, contents).await.unwrap();

        let recent = read_recent(&path, LogFilter::All, 3).await.unwrap();
        let paths: Vec<_> = recent.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/page/1999", "/page/1998", "/page/1997"]);

        // The only ban sits at the very start of the file.
        let banned = read_recent(&path, LogFilter::Banned, 10).await.unwrap();
        assert_eq!(banned, vec![first]);

        let all = read_recent(&path, LogFilter::All, 5000).await.unwrap();
        assert_eq!(all.len(), 2001);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let log = FileAccessLog::spawn(&path, 1);

        // The writer cannot run before this test yields, so only one fits.
        for i in 0..3 {
            log.append(record(&format!("/{i}"), Outcome::Admitted));
        }

        let mut written = Vec::new();
        for _ in 0..50 {
            written = read_recent(&path, LogFilter::All, 10).await.unwrap();
            if !written.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        written = read_recent(&path, LogFilter::All, 10).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].path, "/0");
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_recent(&dir.path().join("absent.log"), LogFilter::All, 10).await.unwrap();
        assert!(records.is_empty());
    }
}
