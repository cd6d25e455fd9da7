//! The pipeline engine: drives one reconciliation run end to end.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Normalizer   raw rows → typed schedule / filing records
//!   2. Merge        schedule records joined to filings
//!   3. Validation   advisory quality flags
//!   4. Master       plan-level table with derived metrics
//!   5. Rollup       sponsor-level table
//!
//! RULES:
//!   - Each stage runs exactly once and sees only earlier stages' output.
//!   - An empty batch, or a batch with every row rejected, aborts the
//!     run before any table is built.
//!   - Both output tables are published in one transaction, or not at all.
//!   - Same batches + same config ⇒ byte-identical tables and event log.

use crate::{
    config::PipelineConfig,
    error::{PipelineAbort, PipelineError, PipelineResult},
    event::{event_type_name, EventLogEntry, PipelineEvent, StagedEvent},
    master_subsystem::{MasterPlanRecord, MasterSubsystem},
    merge_subsystem::MergeSubsystem,
    normalizer_subsystem::{BatchKind, NormalizerSubsystem, RawFilingRow, RawScheduleRow},
    rollup_subsystem::{RollupSubsystem, SponsorRollupRecord},
    store::ReconStore,
    subsystem::PipelineStage,
    summary::RunSummary,
    types::RunId,
    validation_subsystem::{alignment_report, ValidationSubsystem},
};

const ENGINE_STAGE: &str = "engine";

/// Everything one completed run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: RunId,
    pub master: Vec<MasterPlanRecord>,
    pub rollup: Vec<SponsorRollupRecord>,
    pub summary: RunSummary,
    pub events: Vec<StagedEvent>,
}

impl PipelineOutput {
    /// Canonical serialized master plan table.
    pub fn master_table_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(&self.master)?)
    }

    /// Canonical serialized sponsor rollup table.
    pub fn rollup_table_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(&self.rollup)?)
    }

    pub fn log_entries(&self) -> PipelineResult<Vec<EventLogEntry>> {
        log_entries(&self.run_id, &self.events)
    }
}

/// How a run ended before anything was published.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(PipelineOutput),
    Aborted {
        reason: PipelineAbort,
        events: Vec<StagedEvent>,
    },
}

/// Number the events in emission order for the event log.
pub fn log_entries(run_id: &str, events: &[StagedEvent]) -> PipelineResult<Vec<EventLogEntry>> {
    events
        .iter()
        .enumerate()
        .map(|(seq, staged)| {
            Ok(EventLogEntry {
                id: None,
                run_id: run_id.to_string(),
                seq: seq as u64,
                stage: staged.stage.to_string(),
                event_type: event_type_name(&staged.event).to_string(),
                payload: serde_json::to_string(&staged.event)?,
            })
        })
        .collect()
}

/// Run one stage and move what it emitted into the run log, followed
/// by a `StageCompleted` marker.
fn run_stage<S: PipelineStage>(
    stage: &S,
    input: S::Input<'_>,
    rows_in: usize,
    rows_out: impl FnOnce(&S::Output) -> usize,
    log: &mut Vec<StagedEvent>,
) -> PipelineResult<S::Output> {
    let mut emitted = Vec::new();
    let output = stage.run(input, &mut emitted)?;
    let rows_out = rows_out(&output);
    let name = stage.name();
    log.extend(emitted.into_iter().map(|event| StagedEvent { stage: name, event }));
    log.push(StagedEvent {
        stage: name,
        event: PipelineEvent::StageCompleted {
            stage: name.to_string(),
            rows_in,
            rows_out,
        },
    });
    Ok(output)
}

fn engine_event(event: PipelineEvent) -> StagedEvent {
    StagedEvent { stage: ENGINE_STAGE, event }
}

/// Execute all five stages over two batches. Pure: no I/O, no clock.
pub fn execute(
    config: &PipelineConfig,
    run_id: &str,
    schedule_rows: &[RawScheduleRow],
    filing_rows: &[RawFilingRow],
) -> PipelineResult<RunOutcome> {
    let mut events = vec![engine_event(PipelineEvent::RunStarted {
        run_id: run_id.to_string(),
        schedule_rows: schedule_rows.len(),
        filing_rows: filing_rows.len(),
    })];

    let empty = if schedule_rows.is_empty() {
        Some(BatchKind::Schedule)
    } else if filing_rows.is_empty() {
        Some(BatchKind::Filing)
    } else {
        None
    };
    if let Some(batch) = empty {
        let reason = PipelineAbort::EmptyBatch { batch: batch.as_str().to_string() };
        return Ok(RunOutcome::Aborted { reason, events });
    }

    // 1. Normalizer
    let normalized = run_stage(
        &NormalizerSubsystem::new(),
        (schedule_rows, filing_rows),
        schedule_rows.len() + filing_rows.len(),
        |n| n.schedules.len() + n.filings.len(),
        &mut events,
    )?;

    for (batch, usable) in [
        (BatchKind::Schedule, normalized.schedules.len()),
        (BatchKind::Filing, normalized.keyed_filing_count()),
    ] {
        if usable == 0 {
            let reason = PipelineAbort::NoUsableRows {
                batch: batch.as_str().to_string(),
                rejected: normalized.rejected_count(batch),
            };
            return Ok(RunOutcome::Aborted { reason, events });
        }
    }

    let alignment = alignment_report(&normalized.schedules, &normalized.filings);

    // 2. Merge
    let merged = run_stage(
        &MergeSubsystem::new(),
        (normalized.schedules.as_slice(), normalized.filings.as_slice()),
        normalized.schedules.len(),
        Vec::len,
        &mut events,
    )?;

    // 3. Validation
    let merged_rows = merged.len();
    let validated = run_stage(
        &ValidationSubsystem::new(config.clone()),
        merged,
        merged_rows,
        Vec::len,
        &mut events,
    )?;

    // 4. Master
    let validated_rows = validated.len();
    let master = run_stage(
        &MasterSubsystem::new(config.clone()),
        validated,
        validated_rows,
        Vec::len,
        &mut events,
    )?;

    // 5. Rollup
    let rollup = run_stage(
        &RollupSubsystem::new(config.clone()),
        master.as_slice(),
        master.len(),
        Vec::len,
        &mut events,
    )?;

    let summary = RunSummary::build(
        run_id,
        schedule_rows.len(),
        filing_rows.len(),
        &normalized,
        alignment,
        &master,
        &rollup,
        config,
    );

    Ok(RunOutcome::Completed(PipelineOutput {
        run_id: run_id.to_string(),
        master,
        rollup,
        summary,
        events,
    }))
}

/// Pure run: the output tables, or the abort reason.
pub fn run_pipeline(
    config: &PipelineConfig,
    run_id: &str,
    schedule_rows: &[RawScheduleRow],
    filing_rows: &[RawFilingRow],
) -> PipelineResult<PipelineOutput> {
    match execute(config, run_id, schedule_rows, filing_rows)? {
        RunOutcome::Completed(output) => Ok(output),
        RunOutcome::Aborted { reason, .. } => Err(PipelineError::Abort(reason)),
    }
}

/// A run bound to a store: executes the pipeline and publishes its tables.
pub struct PipelineEngine {
    pub run_id: RunId,
    pub config: PipelineConfig,
    store: ReconStore,
}

impl PipelineEngine {
    pub fn new(run_id: RunId, config: PipelineConfig, store: ReconStore) -> Self {
        Self { run_id, config, store }
    }

    /// Run the pipeline and publish both tables atomically.
    /// On abort, only the run row and the event log so far are written.
    pub fn run(
        &self,
        schedule_rows: &[RawScheduleRow],
        filing_rows: &[RawFilingRow],
    ) -> PipelineResult<PipelineOutput> {
        log::info!(
            "run {} started: {} schedule rows, {} filing rows",
            self.run_id,
            schedule_rows.len(),
            filing_rows.len()
        );
        let config_json = serde_json::to_string(&self.config)?;

        match execute(&self.config, &self.run_id, schedule_rows, filing_rows)? {
            RunOutcome::Aborted { reason, events } => {
                log::warn!("run {} aborted: {reason}", self.run_id);
                let entries = log_entries(&self.run_id, &events)?;
                self.store
                    .record_aborted_run(&self.run_id, &config_json, &reason, &entries)?;
                Err(PipelineError::Abort(reason))
            }
            RunOutcome::Completed(mut output) => {
                output.events.push(engine_event(PipelineEvent::RunPublished {
                    run_id: self.run_id.clone(),
                    master_rows: output.master.len(),
                    sponsor_rows: output.rollup.len(),
                }));
                let summary_json = serde_json::to_string(&output.summary)?;
                let entries = output.log_entries()?;
                self.store.publish_run(
                    &self.run_id,
                    &config_json,
                    &summary_json,
                    &entries,
                    &output.master,
                    &output.rollup,
                )?;
                log::info!(
                    "run {} published: {} master rows, {} sponsors",
                    self.run_id,
                    output.master.len(),
                    output.rollup.len()
                );
                Ok(output)
            }
        }
    }

    pub fn store(&self) -> &ReconStore {
        &self.store
    }
}
