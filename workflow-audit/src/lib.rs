//! Audit trail for the orchestration core.
//!
//! [`AuditLog`] is a flat, append-only sequence of [`AuditEntry`] values. Entries
//! are assigned an id and timestamp on append and are never edited or removed.
//! Every append is forwarded, in order, to the registered [`AuditSink`]s.

#![warn(missing_docs, clippy::pedantic)]

mod log;
mod record;
mod sink;

pub use log::AuditLog;
pub use record::{AuditDraft, AuditEntry, AuditKind};
pub use sink::{AuditSink, FileJournalSink, JsonLinesSink, TracingAuditSink};
