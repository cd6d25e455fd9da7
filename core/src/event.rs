//! The run event log: the audit trail of one pipeline run.
//!
//! RULE: stages report what happened to rows ONLY through events.
//! Events are emitted in input order, so two runs over the same
//! batches produce the same log.

use crate::{
    merge_subsystem::{MatchBasis, MergeStatus},
    types::{AckId, RunId},
    validation_subsystem::ValidationFlag,
};
use serde::{Deserialize, Serialize};

/// Every event emitted during a run.
/// Variants are added over time; never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Engine events ──────────────────────────────
    RunStarted {
        run_id: RunId,
        schedule_rows: usize,
        filing_rows: usize,
    },
    StageCompleted {
        stage: String,
        rows_in: usize,
        rows_out: usize,
    },
    RunPublished {
        run_id: RunId,
        master_rows: usize,
        sponsor_rows: usize,
    },

    // ── Normalizer events ──────────────────────────
    RowRejected {
        batch: String,
        row_index: usize,
        reason: String,
    },
    UnknownCategoricalCode {
        ack_id: AckId,
        field: String,
        raw: String,
    },

    // ── Merge events ───────────────────────────────
    DuplicateFilingAck {
        ack_id: AckId,
        row_index: usize,
    },
    MergeResolved {
        ack_id: AckId,
        merge_status: MergeStatus,
        match_basis: MatchBasis,
        filing_ack_id: Option<AckId>,
        candidate_count: usize,
    },

    // ── Validation events ──────────────────────────
    RecordFlagged {
        ack_id: AckId,
        flag: ValidationFlag,
    },
}

/// Extract a stable string name from a PipelineEvent variant.
/// Used for the event_type column in event_log.
pub fn event_type_name(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::RunStarted { .. }             => "run_started",
        PipelineEvent::StageCompleted { .. }         => "stage_completed",
        PipelineEvent::RunPublished { .. }           => "run_published",
        PipelineEvent::RowRejected { .. }            => "row_rejected",
        PipelineEvent::UnknownCategoricalCode { .. } => "unknown_categorical_code",
        PipelineEvent::DuplicateFilingAck { .. }     => "duplicate_filing_ack",
        PipelineEvent::MergeResolved { .. }          => "merge_resolved",
        PipelineEvent::RecordFlagged { .. }          => "record_flagged",
    }
}

/// An event tagged with the stage that emitted it, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEvent {
    pub stage: &'static str,
    pub event: PipelineEvent,
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub seq: u64,
    pub stage: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized PipelineEvent
}
