//! Persistence seam
//!
//! Routed messages are handed to a [`PersistenceSink`] fire-and-forget. The
//! SQLite sink queues records to a dedicated writer thread so that storage
//! latency and storage failures never reach the routing path. The queue is
//! bounded; records arriving while it is full are dropped and counted.

use crate::error::PersistenceError;
use crate::monitor::{LatencyChannel, MessageMonitor};
use dataagent_protocol::{ContentKind, Message};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Storage collaborator. Every method defaults to a no-op.
pub trait PersistenceSink: Send + Sync {
    /// Accepted Registration
    fn record_registration(&self, _message: &Message) {}
    /// Accepted StatusReport
    fn record_status(&self, _message: &Message) {}
    /// Accepted DetectionReport
    fn record_detection(&self, _message: &Message) {}
    /// Accepted Alert
    fn record_alert(&self, _message: &Message) {}
    /// Accepted Task
    fn record_task(&self, _message: &Message) {}
    /// Relayed TaskAck
    fn record_task_ack(&self, _message: &Message) {}
    /// Relayed AlertAck
    fn record_alert_ack(&self, _message: &Message) {}
}

/// Sink that stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PersistenceSink for NullSink {}

struct Record {
    kind: ContentKind,
    node_id: String,
    destination_id: Option<String>,
    timestamp_ms: i64,
    payload: String,
    queued_at: Instant,
}

/// Records the writer queue holds before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// SQLite-backed sink with a background writer
pub struct SqliteSink {
    path: PathBuf,
    sender: Mutex<Option<SyncSender<Record>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and start the writer thread
    ///
    /// Write latency is reported to `monitor` as
    /// [`LatencyChannel::Persistence`].
    pub fn open(path: impl AsRef<Path>, monitor: Arc<MessageMonitor>) -> Result<Self, PersistenceError> {
        Self::open_with_capacity(path, monitor, DEFAULT_QUEUE_CAPACITY)
    }

    /// [`SqliteSink::open`] with a custom writer queue bound
    pub fn open_with_capacity(
        path: impl AsRef<Path>,
        monitor: Arc<MessageMonitor>,
        capacity: usize,
    ) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq_no INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                node_id TEXT NOT NULL,
                destination_id TEXT,
                timestamp_ms INTEGER NOT NULL,
                payload TEXT NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_node ON messages(node_id, kind)",
            [],
        )?;

        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let writer = thread::Builder::new()
            .name("persistence-writer".into())
            .spawn(move || write_loop(conn, rx, monitor))?;

        info!(path = %path.display(), capacity, "SQLite persistence opened");
        Ok(Self {
            path,
            sender: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Records discarded because the writer queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Database location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush queued records and stop the writer
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            if writer.join().is_err() {
                error!("persistence writer panicked");
            }
        }
    }

    fn enqueue(&self, kind: ContentKind, message: &Message) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%kind, error = %e, "failed to serialize message for persistence");
                return;
            }
        };
        let record = Record {
            kind,
            node_id: message.node_id.clone(),
            destination_id: message.destination_id.clone(),
            timestamp_ms: message.timestamp.timestamp_millis(),
            payload,
            queued_at: Instant::now(),
        };

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => match tx.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(%kind, node_id = %message.node_id, dropped, "persistence queue full; record dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!(%kind, "persistence writer gone; record dropped");
                }
            },
            None => debug!(%kind, "persistence shut down; record dropped"),
        }
    }
}

fn write_loop(conn: Connection, rx: Receiver<Record>, monitor: Arc<MessageMonitor>) {
    for record in rx {
        let recorded_at_ms = chrono::Utc::now().timestamp_millis();
        let result = conn.execute(
            "INSERT INTO messages (kind, node_id, destination_id, timestamp_ms, payload, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.kind.as_str(),
                record.node_id,
                record.destination_id,
                record.timestamp_ms,
                record.payload,
                recorded_at_ms,
            ],
        );
        match result {
            Ok(_) => {
                let ms = u64::try_from(record.queued_at.elapsed().as_millis()).unwrap_or(u64::MAX);
                monitor.set_latency(LatencyChannel::Persistence, ms);
            }
            Err(e) => {
                error!(kind = %record.kind, node_id = %record.node_id, error = %e, "persistence write failed");
            }
        }
    }
    debug!("persistence writer stopped");
}

impl PersistenceSink for SqliteSink {
    fn record_registration(&self, message: &Message) {
        self.enqueue(ContentKind::Registration, message);
    }

    fn record_status(&self, message: &Message) {
        self.enqueue(ContentKind::StatusReport, message);
    }

    fn record_detection(&self, message: &Message) {
        self.enqueue(ContentKind::DetectionReport, message);
    }

    fn record_alert(&self, message: &Message) {
        self.enqueue(ContentKind::Alert, message);
    }

    fn record_task(&self, message: &Message) {
        self.enqueue(ContentKind::Task, message);
    }

    fn record_task_ack(&self, message: &Message) {
        self.enqueue(ContentKind::TaskAck, message);
    }

    fn record_alert_ack(&self, message: &Message) {
        self.enqueue(ContentKind::AlertAck, message);
    }
}

impl Drop for SqliteSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("path", &self.path)
            .field("dropped", &self.dropped())
            .finish()
    }
}
