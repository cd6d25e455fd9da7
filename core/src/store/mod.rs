//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Stages never touch it; the engine hands finished tables to
//! `publish_run`, which writes them in a single transaction.

use crate::{
    error::{PipelineAbort, PipelineError, PipelineResult},
    event::EventLogEntry,
    master_subsystem::MasterPlanRecord,
    rollup_subsystem::SponsorRollupRecord,
    summary::RunSummary,
    types::RunId,
};
use rusqlite::{params, Connection, OptionalExtension};

mod master;
mod rollup;

pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_ABORTED: &str = "aborted";

pub struct ReconStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl ReconStore {
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// File path of the database, `None` when in memory.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order. Idempotent.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_master_plan.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_sponsor_rollup.sql"))?;
        Ok(())
    }

    // ── Publishing ─────────────────────────────────────────────

    /// Write the run row, its event log and both output tables.
    /// Either everything becomes visible or nothing does.
    pub fn publish_run(
        &self,
        run_id: &str,
        config_json: &str,
        summary_json: &str,
        events: &[EventLogEntry],
        master: &[MasterPlanRecord],
        rollup: &[SponsorRollupRecord],
    ) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.insert_run(run_id, STATUS_PUBLISHED, None, config_json, Some(summary_json))?;
        for entry in events {
            self.append_event(entry)?;
        }
        for (seq, record) in master.iter().enumerate() {
            self.insert_master_row(run_id, seq, record)?;
        }
        for (rank, record) in rollup.iter().enumerate() {
            self.insert_sponsor_row(run_id, rank, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record a run that aborted: run row and events only, no tables.
    pub fn record_aborted_run(
        &self,
        run_id: &str,
        config_json: &str,
        reason: &PipelineAbort,
        events: &[EventLogEntry],
    ) -> PipelineResult<()> {
        let reason_json = serde_json::to_string(reason)?;
        let tx = self.conn.unchecked_transaction()?;
        self.insert_run(run_id, STATUS_ABORTED, Some(&reason_json), config_json, None)?;
        for entry in events {
            self.append_event(entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    fn insert_run(
        &self,
        run_id: &str,
        status: &str,
        abort_reason: Option<&str>,
        config_json: &str,
        summary_json: Option<&str>,
    ) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, status, abort_reason, config_json, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, status, abort_reason, config_json, summary_json],
        )?;
        Ok(())
    }

    pub fn run_row(&self, run_id: &str) -> PipelineResult<Option<RunRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, status, abort_reason, config_json, summary_json
                 FROM run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRow {
                        run_id: row.get(0)?,
                        status: row.get(1)?,
                        abort_reason: row.get(2)?,
                        config_json: row.get(3)?,
                        summary_json: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// `published` or `aborted`.
    pub fn run_status(&self, run_id: &str) -> PipelineResult<String> {
        self.run_row(run_id)?
            .map(|r| r.status)
            .ok_or_else(|| PipelineError::RunNotFound { run_id: run_id.to_string() })
    }

    /// The summary of a published run; `None` for an aborted one.
    pub fn run_summary(&self, run_id: &str) -> PipelineResult<Option<RunSummary>> {
        let row = self
            .run_row(run_id)?
            .ok_or_else(|| PipelineError::RunNotFound { run_id: run_id.to_string() })?;
        row.summary_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    /// Why a run aborted; `None` for a published one.
    pub fn abort_reason(&self, run_id: &str) -> PipelineResult<Option<PipelineAbort>> {
        let row = self
            .run_row(run_id)?
            .ok_or_else(|| PipelineError::RunNotFound { run_id: run_id.to_string() })?;
        row.abort_reason
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    pub fn run_ids(&self) -> PipelineResult<Vec<RunId>> {
        let mut stmt = self.conn.prepare("SELECT run_id FROM run ORDER BY run_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ── Event log ──────────────────────────────────────────────

    fn append_event(&self, entry: &EventLogEntry) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, seq, stage, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.seq as i64,
                entry.stage,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> PipelineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    run_id: row.get(1)?,
                    seq: row.get::<_, i64>(2)? as u64,
                    stage: row.get(3)?,
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_events_of_type(&self, run_id: &str, event_type: &str) -> PipelineResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

/// Count column value; refuses anything SQLite INTEGER cannot hold.
fn sql_count(column: &'static str, value: u64) -> PipelineResult<i64> {
    i64::try_from(value).map_err(|_| PipelineError::CountOverflow { column, value })
}

fn sql_count_opt(column: &'static str, value: Option<u64>) -> PipelineResult<Option<i64>> {
    value.map(|v| sql_count(column, v)).transpose()
}

/// Decode a JSON text column inside a row mapper.
fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: RunId,
    pub status: String,
    pub abort_reason: Option<String>,
    pub config_json: String,
    pub summary_json: Option<String>,
}

/// One persisted master plan row. Absent, rejected and undefined
/// values are `None` (SQL NULL).
#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlanRow {
    pub run_id: RunId,
    pub seq: usize,
    pub ack_id: String,
    pub ein: Option<String>,
    pub plan_num: Option<String>,
    pub plan_year: Option<i64>,
    pub reporting_period: Option<String>,
    pub filing_date: Option<String>,
    pub filing_ack_id: Option<String>,
    pub plan_name: Option<String>,
    pub sponsor_name: Option<String>,
    pub business_code: Option<String>,
    pub industry_sector: Option<String>,
    pub active_count: Option<i64>,
    pub retired_count: Option<i64>,
    pub terminated_count: Option<i64>,
    pub total_participants: Option<i64>,
    pub liability_active: Option<f64>,
    pub liability_retired: Option<f64>,
    pub liability_terminated: Option<f64>,
    pub liability_total: Option<f64>,
    pub effective_interest_rate: Option<f64>,
    pub segment_rate_1: Option<f64>,
    pub segment_rate_2: Option<f64>,
    pub segment_rate_3: Option<f64>,
    pub segment_rate_type: String,
    pub mortality_code: String,
    pub actuary_name: Option<String>,
    pub actuary_firm: Option<String>,
    pub actuary_city: Option<String>,
    pub actuary_state: Option<String>,
    pub merge_status: String,
    pub match_basis: String,
    pub candidate_count: i64,
    pub merge_quality: String,
    pub flags: Vec<String>,
    pub annuitant_ratio: Option<f64>,
    pub liability_per_active: Option<f64>,
    pub liability_per_retiree: Option<f64>,
    pub db_size_category: String,
    pub rejected_fields: Vec<(String, String)>,
}

/// One persisted sponsor rollup row, in outreach order.
#[derive(Debug, Clone, PartialEq)]
pub struct SponsorRollupRow {
    pub run_id: RunId,
    pub rank: usize,
    pub ein: String,
    pub sponsor_name: Option<String>,
    pub industry_sector: Option<String>,
    pub plan_numbers: Vec<String>,
    pub plan_count: i64,
    pub unverified_plan_count: i64,
    pub duplicate_filing_count: i64,
    pub liability_active: Option<f64>,
    pub liability_retired: Option<f64>,
    pub liability_terminated: Option<f64>,
    pub liability_total: Option<f64>,
    pub active_participants: Option<i64>,
    pub terminated_participants: Option<i64>,
    pub total_participants: Option<i64>,
    pub annuitant_exposure: Option<i64>,
}
