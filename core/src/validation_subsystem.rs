//! Alignment validator (stage 3).
//!
//! Runs cross-field consistency checks on merged records and attaches
//! named quality flags. Advisory only: a record is never rejected or
//! corrected here, the flags just feed `merge_quality` downstream.
//!
//! Also builds the batch-level alignment report (ack_id overlap and
//! filing-date ranges of the two batches) carried in the run summary.

use crate::{
    config::PipelineConfig,
    error::PipelineResult,
    event::PipelineEvent,
    merge_subsystem::MergedPlanRecord,
    normalizer_subsystem::{FilingRecord, ScheduleRecord},
    subsystem::PipelineStage,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    /// active + retired + terminated exceeds total beyond tolerance.
    ParticipantCountMismatch,
    /// A reported liability is below zero.
    NegativeLiability,
    /// Liabilities reported without an actuary name or firm.
    MissingActuary,
    /// A clean match whose filing carries no sponsor name.
    MissingSponsorName,
    /// A numeric cell held text that failed coercion.
    RejectedNumericField,
}

impl ValidationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParticipantCountMismatch => "participant_count_mismatch",
            Self::NegativeLiability => "negative_liability",
            Self::MissingActuary => "missing_actuary",
            Self::MissingSponsorName => "missing_sponsor_name",
            Self::RejectedNumericField => "rejected_numeric_field",
        }
    }
}

/// A merged record with the flags the validator raised on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPlanRecord {
    pub merged: MergedPlanRecord,
    pub flags: BTreeSet<ValidationFlag>,
}

/// Run every check against one record. Pure; the record is untouched.
pub fn validate_record(record: &MergedPlanRecord, config: &PipelineConfig) -> BTreeSet<ValidationFlag> {
    let schedule = &record.schedule;
    let mut flags = BTreeSet::new();

    if participant_counts_inconsistent(schedule, config.participant_count_tolerance) {
        flags.insert(ValidationFlag::ParticipantCountMismatch);
    }

    let negative = [
        &schedule.liability_active,
        &schedule.liability_retired,
        &schedule.liability_terminated,
        &schedule.liability_total,
    ]
    .iter()
    .any(|f| f.value().is_some_and(|v| v < 0.0));
    if negative {
        flags.insert(ValidationFlag::NegativeLiability);
    }

    if schedule.has_any_liability()
        && schedule.actuary_name.is_none()
        && schedule.actuary_firm.is_none()
    {
        flags.insert(ValidationFlag::MissingActuary);
    }

    if record.merge_status.is_clean_match() && record.sponsor_name().is_none() {
        flags.insert(ValidationFlag::MissingSponsorName);
    }

    if !schedule.rejected_fields().is_empty() {
        flags.insert(ValidationFlag::RejectedNumericField);
    }

    flags
}

/// The components present already exceed the total by more than the
/// tolerance. Absent components contribute nothing; an absent total
/// leaves nothing to compare against.
fn participant_counts_inconsistent(schedule: &ScheduleRecord, tolerance: u64) -> bool {
    let Some(total) = schedule.total_participants.value() else {
        return false;
    };
    let components: u64 = [
        &schedule.active_count,
        &schedule.retired_count,
        &schedule.terminated_count,
    ]
    .iter()
    .filter_map(|f| f.value())
    .fold(0u64, u64::saturating_add);
    components > total.saturating_add(tolerance)
}

pub struct ValidationSubsystem {
    config: PipelineConfig,
}

impl ValidationSubsystem {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl PipelineStage for ValidationSubsystem {
    type Input<'a> = Vec<MergedPlanRecord>;
    type Output = Vec<ValidatedPlanRecord>;

    fn name(&self) -> &'static str {
        "validation"
    }

    fn run(
        &self,
        merged: Self::Input<'_>,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<ValidatedPlanRecord>> {
        let validated: Vec<ValidatedPlanRecord> = merged
            .into_iter()
            .map(|record| {
                let flags = validate_record(&record, &self.config);
                for flag in &flags {
                    events.push(PipelineEvent::RecordFlagged {
                        ack_id: record.schedule.ack_id.clone(),
                        flag: *flag,
                    });
                }
                ValidatedPlanRecord { merged: record, flags }
            })
            .collect();

        log::debug!(
            "validation: {} of {} records flagged",
            validated.iter().filter(|r| !r.flags.is_empty()).count(),
            validated.len()
        );
        Ok(validated)
    }
}

// ── Batch alignment report ─────────────────────────────────────────

const LOW_ALIGNMENT_PCT: f64 = 10.0;

/// How well the two batches line up on `ack_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub schedule_ack_unique: usize,
    pub filing_ack_unique: usize,
    pub ack_matches: usize,
    /// Share of distinct schedule ack_ids present in the filing batch.
    pub ack_match_pct: f64,
    pub schedule_date_range: Option<(NaiveDate, NaiveDate)>,
    pub filing_date_range: Option<(NaiveDate, NaiveDate)>,
    pub diagnosis: String,
}

fn date_range<'a>(dates: impl Iterator<Item = Option<NaiveDate>> + 'a) -> Option<(NaiveDate, NaiveDate)> {
    dates.flatten().fold(None, |acc, d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    })
}

/// Compare the two normalized batches before trusting the merge.
pub fn alignment_report(schedules: &[ScheduleRecord], filings: &[FilingRecord]) -> AlignmentReport {
    let schedule_acks: HashSet<&str> = schedules.iter().map(|s| s.ack_id.as_str()).collect();
    let filing_acks: HashSet<&str> = filings.iter().filter_map(|f| f.ack_id.as_deref()).collect();
    let ack_matches = schedule_acks.intersection(&filing_acks).count();
    let ack_match_pct = if schedule_acks.is_empty() {
        0.0
    } else {
        ack_matches as f64 / schedule_acks.len() as f64 * 100.0
    };

    let diagnosis = if ack_matches == 0 {
        "No ack_ids overlap: the batches likely come from different release batches, \
         or the filing batch lacks headers for these plans."
    } else if ack_match_pct < LOW_ALIGNMENT_PCT {
        "Very low alignment (<10%): most schedules lack a matching filing; \
         the filing batch may be partial or early-cycle."
    } else {
        "Batches appear reasonably aligned."
    };

    AlignmentReport {
        schedule_ack_unique: schedule_acks.len(),
        filing_ack_unique: filing_acks.len(),
        ack_matches,
        ack_match_pct,
        schedule_date_range: date_range(schedules.iter().map(|s| s.filing_date)),
        filing_date_range: date_range(filings.iter().map(|f| f.filing_date)),
        diagnosis: diagnosis.to_string(),
    }
}
