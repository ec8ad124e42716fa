//! In-memory append-only audit log.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use workflow_primitives::{Sequence, WorkflowId};

use crate::record::{AuditDraft, AuditEntry};
use crate::sink::AuditSink;

/// Append-only, chronologically ordered audit log.
///
/// The log is not internally synchronised; the owner serialises appends (the
/// orchestration registry keeps it behind the same lock as every other piece of
/// state, so id allocation and appends cannot interleave).
#[derive(Default)]
pub struct AuditLog {
    sequence: Sequence,
    entries: Vec<AuditEntry>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("entries", &self.entries.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditLog {
    /// Creates an empty log without sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink, returning the updated log for chaining.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Adds a sink that receives every subsequent append.
    pub fn add_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Appends a draft, assigning its id and timestamp.
    pub fn append(&mut self, draft: AuditDraft) -> &AuditEntry {
        let id = self.sequence.next_id();
        let entry = AuditEntry::from_draft(id, Utc::now(), draft);
        for sink in &self.sinks {
            sink.record(&entry);
        }
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// All entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries scoped to `workflow_id`, in append order.
    pub fn for_workflow(&self, workflow_id: WorkflowId) -> impl Iterator<Item = &AuditEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.workflow_id() == Some(workflow_id))
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
