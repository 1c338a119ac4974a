// crates/chainpulse-core/src/runtime/audit.rs
// ============================================================================
// Module: ChainPulse Pipeline Audit Logging
// Description: Structured audit events for analysis runs and verifications.
// Purpose: Emit hash-only JSON-line audit records without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events carry digests, ids, and error kinds only. Draft text never
//! reaches a sink, so audit logs can be shipped without redaction. Sinks are
//! best-effort: a failed write is dropped rather than failing the pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::ContentHash;
use crate::core::InsightId;
use crate::core::MarketSnapshotRef;
use crate::core::PredictionId;
use crate::core::TxHash;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label for an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Committed and persisted.
    Committed,
    /// Aborted before any ledger write.
    Rejected,
    /// The ledger write failed.
    Failed,
    /// Committed on the ledger but not persisted locally.
    CommittedNotPersisted,
}

/// Analysis run audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Run outcome.
    pub outcome: AnalysisOutcome,
    /// Snapshot reference when supplied.
    pub snapshot: Option<MarketSnapshotRef>,
    /// Number of drafts in the run.
    pub batch_size: usize,
    /// Content hashes computed for the run.
    pub content_hashes: Vec<ContentHash>,
    /// Transaction reference when the commit finalized.
    pub tx_hash: Option<TxHash>,
    /// First assigned prediction id when ids were derived.
    pub first_prediction_id: Option<PredictionId>,
    /// Stable error kind on failure.
    pub error_kind: Option<&'static str>,
}

/// Parameters for [`AnalysisAuditEvent::new`].
#[derive(Debug, Clone)]
pub struct AnalysisAuditEventParams {
    /// Run outcome.
    pub outcome: AnalysisOutcome,
    /// Snapshot reference when supplied.
    pub snapshot: Option<MarketSnapshotRef>,
    /// Number of drafts in the run.
    pub batch_size: usize,
    /// Content hashes computed for the run.
    pub content_hashes: Vec<ContentHash>,
    /// Transaction reference when the commit finalized.
    pub tx_hash: Option<TxHash>,
    /// First assigned prediction id when ids were derived.
    pub first_prediction_id: Option<PredictionId>,
    /// Stable error kind on failure.
    pub error_kind: Option<&'static str>,
}

impl AnalysisAuditEvent {
    /// Creates a new analysis audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: AnalysisAuditEventParams) -> Self {
        Self {
            event: "analysis_run",
            timestamp_ms: now_ms(),
            outcome: params.outcome,
            snapshot: params.snapshot,
            batch_size: params.batch_size,
            content_hashes: params.content_hashes,
            tx_hash: params.tx_hash,
            first_prediction_id: params.first_prediction_id,
            error_kind: params.error_kind,
        }
    }
}

/// Verification audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Insight checked, when verification started from a stored record.
    pub insight_id: Option<InsightId>,
    /// Ledger index checked.
    pub prediction_id: Option<PredictionId>,
    /// Status label (`verified`, `mismatch`, `unavailable`).
    pub status: &'static str,
    /// Unavailability reason label.
    pub reason: Option<&'static str>,
}

impl VerificationAuditEvent {
    /// Creates a new verification audit event with a consistent timestamp.
    #[must_use]
    pub fn new(
        insight_id: Option<InsightId>,
        prediction_id: Option<PredictionId>,
        status: &'static str,
        reason: Option<&'static str>,
    ) -> Self {
        Self {
            event: "verification",
            timestamp_ms: now_ms(),
            insight_id,
            prediction_id,
            status,
            reason,
        }
    }
}

/// Returns wall-clock milliseconds for audit timestamps.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for pipeline events.
pub trait PipelineAuditSink: Send + Sync {
    /// Record an analysis run event.
    fn record_analysis(&self, event: &AnalysisAuditEvent);

    /// Record a verification event.
    fn record_verification(&self, _event: &VerificationAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl PipelineAuditSink for StderrAuditSink {
    fn record_analysis(&self, event: &AnalysisAuditEvent) {
        write_stderr(event);
    }

    fn record_verification(&self, event: &VerificationAuditEvent) {
        write_stderr(event);
    }
}

/// Writes one JSON line to stderr.
fn write_stderr<T: Serialize>(event: &T) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(std::io::stderr(), "{payload}");
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one JSON line.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl PipelineAuditSink for FileAuditSink {
    fn record_analysis(&self, event: &AnalysisAuditEvent) {
        self.append(event);
    }

    fn record_verification(&self, event: &VerificationAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl PipelineAuditSink for NoopAuditSink {
    fn record_analysis(&self, _event: &AnalysisAuditEvent) {}

    fn record_verification(&self, _event: &VerificationAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions favor direct unwrap/expect for clarity."
    )]

    use super::*;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = std::env::temp_dir().join(format!("chainpulse-audit-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("audit.jsonl");
        let _ = std::fs::remove_file(&path);
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record_analysis(&AnalysisAuditEvent::new(AnalysisAuditEventParams {
            outcome: AnalysisOutcome::Rejected,
            snapshot: None,
            batch_size: 2,
            content_hashes: Vec::new(),
            tx_hash: None,
            first_prediction_id: None,
            error_kind: Some("schema_invalid"),
        }));
        sink.record_verification(&VerificationAuditEvent::new(
            None,
            Some(PredictionId::new(4)),
            "verified",
            None,
        ));
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "analysis_run");
        assert_eq!(lines[0]["outcome"], "rejected");
        assert_eq!(lines[0]["error_kind"], "schema_invalid");
        assert_eq!(lines[1]["event"], "verification");
        assert_eq!(lines[1]["prediction_id"], 4);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
