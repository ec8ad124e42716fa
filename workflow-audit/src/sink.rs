//! Mirrors that receive audit entries as they are appended.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::record::AuditEntry;

/// Receives every entry appended to an [`AuditLog`](crate::AuditLog).
///
/// Sinks are called while the log owner holds its lock, so they must be quick
/// and must not call back into the orchestrator.
pub trait AuditSink: Send + Sync {
    /// Records the appended entry.
    fn record(&self, entry: &AuditEntry);
}

/// Sink that emits each entry as a structured tracing event.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        let details = serde_json::Value::Object(entry.details().clone());
        info!(
            audit_id = %entry.id(),
            kind = %entry.kind(),
            workflow_id = ?entry.workflow_id().map(|id| id.to_string()),
            actor_id = ?entry.actor_id().map(|id| id.to_string()),
            details = %details,
            "audit entry appended"
        );
    }
}

/// Sink writing newline-delimited JSON entries to a synchronous writer.
///
/// Meant for in-memory buffers and other writers that never block; use
/// [`FileJournalSink`] for files. Write failures are logged and swallowed: the
/// in-memory log stays the source of truth.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink, returning the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entry(&self, entry: &AuditEntry) -> io::Result<()> {
        let line = serde_json::to_vec(entry)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> AuditSink for JsonLinesSink<W> {
    fn record(&self, entry: &AuditEntry) {
        if let Err(err) = self.write_entry(entry) {
            warn!(audit_id = %entry.id(), error = %err, "failed to mirror audit entry");
        }
    }
}

enum JournalCommand {
    Line(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// File-backed sink appending newline-delimited JSON entries.
///
/// [`AuditSink::record`] only serializes the entry and queues it; a background
/// task owns the file and writes lines in append order with `tokio::fs`.
#[derive(Debug)]
pub struct FileJournalSink {
    path: PathBuf,
    queue: mpsc::UnboundedSender<JournalCommand>,
}

impl FileJournalSink {
    /// Opens (or creates) the journal at `path` in append mode and starts its
    /// writer task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let (queue, commands) = mpsc::unbounded_channel();
        tokio::spawn(write_journal(path.clone(), file, commands));

        Ok(Self { path, queue })
    }

    /// Returns the journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until every entry recorded so far has been written.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::BrokenPipe`] when the writer task has stopped.
    pub async fn flush(&self) -> io::Result<()> {
        let (done, written) = oneshot::channel();
        self.queue
            .send(JournalCommand::Flush(done))
            .map_err(|_| journal_closed())?;
        written.await.map_err(|_| journal_closed())
    }
}

impl AuditSink for FileJournalSink {
    fn record(&self, entry: &AuditEntry) {
        let line = match serde_json::to_vec(entry) {
            Ok(line) => line,
            Err(err) => {
                warn!(audit_id = %entry.id(), error = %err, "failed to encode audit entry");
                return;
            }
        };
        if self.queue.send(JournalCommand::Line(line)).is_err() {
            warn!(audit_id = %entry.id(), path = %self.path.display(), "audit journal writer stopped");
        }
    }
}

fn journal_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "audit journal writer stopped")
}

async fn write_journal(
    path: PathBuf,
    mut file: File,
    mut commands: mpsc::UnboundedReceiver<JournalCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            JournalCommand::Line(line) => {
                if let Err(err) = append_line(&mut file, &line).await {
                    warn!(path = %path.display(), error = %err, "failed to mirror audit entry");
                }
            }
            JournalCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn append_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line).await?;
    file.write_u8(b'\n').await?;
    file.flush().await
}
