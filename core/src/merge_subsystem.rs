//! Merge engine (stage 2).
//!
//! Joins normalized schedule records to normalized parent filings.
//! The schedule batch drives the universe: every schedule record yields
//! exactly one merged record; filings nobody matches are dropped.
//!
//! Join order:
//!   1. primary key `ack_id`, cross-verified on `(ein, plan_num)`
//!   2. fallback on `(ein, plan_num)` alone
//!   3. otherwise unmatched, filing fields left absent
//!
//! Fallback tie-break when several filings share the pair: closest
//! reporting period first, then lexically earliest `ack_id`. Filings
//! without a period rank after those with one.

use crate::{
    error::PipelineResult,
    event::PipelineEvent,
    normalizer_subsystem::{FilingRecord, ScheduleRecord},
    subsystem::PipelineStage,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Matched,
    PrimaryMatchSecondaryMismatch,
    FallbackMatched,
    FallbackAmbiguous,
    Unmatched,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::PrimaryMatchSecondaryMismatch => "primary_match_secondary_mismatch",
            Self::FallbackMatched => "fallback_matched",
            Self::FallbackAmbiguous => "fallback_ambiguous",
            Self::Unmatched => "unmatched",
        }
    }

    /// Statuses under which the filing is trusted to describe the same plan.
    pub fn is_clean_match(&self) -> bool {
        matches!(self, Self::Matched | Self::FallbackMatched)
    }
}

/// Which key(s) produced the join, for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    /// `ack_id` matched and `(ein, plan_num)` agreed.
    PrimaryAndSecondary,
    /// `ack_id` matched, `(ein, plan_num)` did not agree.
    Primary,
    /// `(ein, plan_num)` alone.
    Fallback,
    None,
}

impl MatchBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryAndSecondary => "primary_and_secondary",
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::None => "none",
        }
    }
}

/// One schedule record joined with zero-or-one filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPlanRecord {
    pub schedule: ScheduleRecord,
    /// `None` when unmatched: filing-sourced fields are absent, not defaulted.
    pub filing: Option<FilingRecord>,
    pub merge_status: MergeStatus,
    pub match_basis: MatchBasis,
    /// Filings that were eligible for this join (1 for primary matches).
    pub candidate_count: usize,
}

impl MergedPlanRecord {
    pub fn sponsor_name(&self) -> Option<&str> {
        self.filing.as_ref().and_then(|f| f.sponsor_name.as_deref())
    }
}

type SecondaryKey<'a> = (&'a str, &'a str);

fn secondary_key_of<'a>(ein: &'a Option<String>, plan_num: &'a Option<String>) -> Option<SecondaryKey<'a>> {
    Some((ein.as_deref()?, plan_num.as_deref()?))
}

/// Both records carry `(ein, plan_num)` and the pairs are equal.
/// A pair missing on either side cannot be verified and counts as disagreement.
pub fn secondary_keys_agree(schedule: &ScheduleRecord, filing: &FilingRecord) -> bool {
    match (
        secondary_key_of(&schedule.ein, &schedule.plan_num),
        secondary_key_of(&filing.ein, &filing.plan_num),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Calendar-day distance between two reporting periods.
fn period_distance_days(a: NaiveDate, b: NaiveDate) -> i64 {
    a.signed_duration_since(b).num_days().abs()
}

/// Pick among several fallback candidates: closest reporting period,
/// then earliest `ack_id`, filings without one last (by row).
/// `None` only for an empty slice.
pub fn pick_fallback_candidate<'a>(
    schedule_period: Option<NaiveDate>,
    candidates: &[&'a FilingRecord],
) -> Option<&'a FilingRecord> {
    let rank = |f: &'a FilingRecord| {
        let distance = match (schedule_period, f.reporting_period) {
            (Some(s), Some(p)) => Some(period_distance_days(s, p)),
            _ => None,
        };
        let ack = f.ack_id.as_deref();
        (
            distance.is_none(),
            distance.unwrap_or(0),
            ack.is_none(),
            ack.unwrap_or_default(),
            f.row_index,
        )
    };
    candidates.iter().copied().min_by_key(|f| rank(*f))
}

/// Lookup tables over the filing batch.
struct FilingIndex<'a> {
    by_ack: HashMap<&'a str, &'a FilingRecord>,
    by_secondary: HashMap<SecondaryKey<'a>, Vec<&'a FilingRecord>>,
}

impl<'a> FilingIndex<'a> {
    /// First occurrence of a duplicated filing `ack_id` wins the primary
    /// lookup; later ones are reported but still eligible for fallback.
    fn build(filings: &'a [FilingRecord], events: &mut Vec<PipelineEvent>) -> Self {
        let mut by_ack: HashMap<&str, &FilingRecord> = HashMap::with_capacity(filings.len());
        let mut by_secondary: HashMap<SecondaryKey, Vec<&FilingRecord>> = HashMap::new();

        for filing in filings {
            match filing.ack_id.as_deref() {
                Some(ack) if by_ack.contains_key(ack) => {
                    log::warn!(
                        "duplicate filing ack_id {ack} at row {}; first occurrence kept for primary match",
                        filing.row_index
                    );
                    events.push(PipelineEvent::DuplicateFilingAck {
                        ack_id: ack.to_string(),
                        row_index: filing.row_index,
                    });
                }
                Some(ack) => {
                    by_ack.insert(ack, filing);
                }
                None => {}
            }
            if let Some(key) = secondary_key_of(&filing.ein, &filing.plan_num) {
                by_secondary.entry(key).or_default().push(filing);
            }
        }
        Self { by_ack, by_secondary }
    }
}

pub struct MergeSubsystem;

impl MergeSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn merge_one(schedule: &ScheduleRecord, index: &FilingIndex<'_>) -> MergedPlanRecord {
        // 1. Primary key.
        if let Some(filing) = index.by_ack.get(schedule.ack_id.as_str()) {
            let (merge_status, match_basis) = if secondary_keys_agree(schedule, filing) {
                (MergeStatus::Matched, MatchBasis::PrimaryAndSecondary)
            } else {
                (MergeStatus::PrimaryMatchSecondaryMismatch, MatchBasis::Primary)
            };
            return MergedPlanRecord {
                schedule: schedule.clone(),
                filing: Some((*filing).clone()),
                merge_status,
                match_basis,
                candidate_count: 1,
            };
        }

        // 2. Fallback on (ein, plan_num).
        let candidates = secondary_key_of(&schedule.ein, &schedule.plan_num)
            .and_then(|key| index.by_secondary.get(&key))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let (filing, merge_status, match_basis) = match candidates {
            [] => (None, MergeStatus::Unmatched, MatchBasis::None),
            [only] => (Some(*only), MergeStatus::FallbackMatched, MatchBasis::Fallback),
            many => (
                pick_fallback_candidate(schedule.reporting_period, many),
                MergeStatus::FallbackAmbiguous,
                MatchBasis::Fallback,
            ),
        };

        MergedPlanRecord {
            schedule: schedule.clone(),
            filing: filing.cloned(),
            merge_status,
            match_basis,
            candidate_count: candidates.len(),
        }
    }
}

impl Default for MergeSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStage for MergeSubsystem {
    type Input<'a> = (&'a [ScheduleRecord], &'a [FilingRecord]);
    type Output = Vec<MergedPlanRecord>;

    fn name(&self) -> &'static str {
        "merge"
    }

    fn run(
        &self,
        (schedules, filings): Self::Input<'_>,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<MergedPlanRecord>> {
        let index = FilingIndex::build(filings, events);

        // Duplicate schedule ack_ids are merged independently.
        let merged: Vec<MergedPlanRecord> = schedules
            .iter()
            .map(|schedule| {
                let record = Self::merge_one(schedule, &index);
                events.push(PipelineEvent::MergeResolved {
                    ack_id: record.schedule.ack_id.clone(),
                    merge_status: record.merge_status,
                    match_basis: record.match_basis,
                    filing_ack_id: record.filing.as_ref().and_then(|f| f.ack_id.clone()),
                    candidate_count: record.candidate_count,
                });
                record
            })
            .collect();

        log::debug!(
            "merge: {} schedules joined against {} filings",
            merged.len(),
            filings.len()
        );
        Ok(merged)
    }
}
