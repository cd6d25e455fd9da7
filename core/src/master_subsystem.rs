//! Master dataset builder (stage 4).
//!
//! Flattens each validated merge result into one plan-level record and
//! attaches the derived metrics. Pure per-record transform; rows keep
//! the schedule batch's input order.

use crate::{
    config::{DbSizeCategory, PipelineConfig},
    error::PipelineResult,
    event::PipelineEvent,
    merge_subsystem::{MatchBasis, MergeStatus},
    normalizer_subsystem::{MortalityCode, SegmentRateType},
    subsystem::PipelineStage,
    types::{AckId, Derived, Ein, Field},
    validation_subsystem::{ValidatedPlanRecord, ValidationFlag},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Composite confidence in a plan row, from merge outcome and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeQuality {
    High,
    Medium,
    Low,
    None,
}

impl MergeQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }

    /// Higher is better. Used to pick a representative among duplicates.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::None => 0,
        }
    }

    pub fn is_verified(&self) -> bool {
        *self != Self::None
    }
}

pub fn merge_quality(status: MergeStatus, flags: &BTreeSet<ValidationFlag>) -> MergeQuality {
    let flagged = !flags.is_empty();
    match status {
        MergeStatus::Matched if !flagged => MergeQuality::High,
        MergeStatus::Matched => MergeQuality::Medium,
        MergeStatus::FallbackMatched if !flagged => MergeQuality::Medium,
        MergeStatus::FallbackMatched => MergeQuality::Low,
        MergeStatus::PrimaryMatchSecondaryMismatch | MergeStatus::FallbackAmbiguous => {
            MergeQuality::Low
        }
        MergeStatus::Unmatched => MergeQuality::None,
    }
}

/// One row of the master plan table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterPlanRecord {
    // ── Identity ───────────────────────────────────
    pub ack_id: AckId,
    pub ein: Option<Ein>,
    pub plan_num: Option<String>,
    pub plan_year: Field<i32>,
    pub reporting_period: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,

    // ── Filing side (absent when unmatched) ────────
    pub filing_ack_id: Option<AckId>,
    pub plan_name: Option<String>,
    pub sponsor_name: Option<String>,
    pub business_code: Option<String>,
    pub industry_sector: Option<String>,

    // ── Schedule side ──────────────────────────────
    pub active_count: Field<u64>,
    pub retired_count: Field<u64>,
    pub terminated_count: Field<u64>,
    pub total_participants: Field<u64>,
    pub liability_active: Field<f64>,
    pub liability_retired: Field<f64>,
    pub liability_terminated: Field<f64>,
    pub liability_total: Field<f64>,
    pub effective_interest_rate: Field<f64>,
    pub segment_rates: [Field<f64>; 3],
    pub segment_rate_type: SegmentRateType,
    pub mortality_code: MortalityCode,
    pub actuary_name: Option<String>,
    pub actuary_firm: Option<String>,
    pub actuary_city: Option<String>,
    pub actuary_state: Option<String>,

    // ── Reconciliation ─────────────────────────────
    pub merge_status: MergeStatus,
    pub match_basis: MatchBasis,
    pub candidate_count: usize,
    pub flags: BTreeSet<ValidationFlag>,
    pub merge_quality: MergeQuality,

    // ── Derived ────────────────────────────────────
    pub annuitant_ratio: Derived<f64>,
    pub liability_per_active: Derived<f64>,
    pub liability_per_retiree: Derived<f64>,
    pub db_size_category: DbSizeCategory,

    /// `(field, raw text)` of numeric cells that failed coercion.
    pub rejected_fields: Vec<(String, String)>,
}

fn as_f64(count: &Field<u64>) -> Option<f64> {
    count.value().map(|c| c as f64)
}

pub fn build_master_record(validated: ValidatedPlanRecord, config: &PipelineConfig) -> MasterPlanRecord {
    let ValidatedPlanRecord { merged, flags } = validated;
    let s = merged.schedule;
    let filing = merged.filing;

    let annuitant_ratio = Derived::ratio(as_f64(&s.retired_count), as_f64(&s.total_participants));
    let liability_per_active = Derived::ratio(s.liability_active.value(), as_f64(&s.active_count));
    let liability_per_retiree = Derived::ratio(s.liability_retired.value(), as_f64(&s.retired_count));
    let db_size_category = config.size_category(s.total_participants.value());
    let merge_quality = merge_quality(merged.merge_status, &flags);
    let rejected_fields = s
        .rejected_fields()
        .into_iter()
        .map(|(name, raw)| (name.to_string(), raw))
        .collect();

    let (filing_ack_id, plan_name, sponsor_name, business_code, industry_sector) = match filing {
        Some(f) => (f.ack_id, f.plan_name, f.sponsor_name, f.business_code, f.industry_sector),
        None => (None, None, None, None, None),
    };

    MasterPlanRecord {
        ack_id: s.ack_id,
        ein: s.ein,
        plan_num: s.plan_num,
        plan_year: s.plan_year,
        reporting_period: s.reporting_period,
        filing_date: s.filing_date,
        filing_ack_id,
        plan_name,
        sponsor_name,
        business_code,
        industry_sector,
        active_count: s.active_count,
        retired_count: s.retired_count,
        terminated_count: s.terminated_count,
        total_participants: s.total_participants,
        liability_active: s.liability_active,
        liability_retired: s.liability_retired,
        liability_terminated: s.liability_terminated,
        liability_total: s.liability_total,
        effective_interest_rate: s.effective_interest_rate,
        segment_rates: s.segment_rates,
        segment_rate_type: s.segment_rate_type,
        mortality_code: s.mortality_code,
        actuary_name: s.actuary_name,
        actuary_firm: s.actuary_firm,
        actuary_city: s.actuary_city,
        actuary_state: s.actuary_state,
        merge_status: merged.merge_status,
        match_basis: merged.match_basis,
        candidate_count: merged.candidate_count,
        flags,
        merge_quality,
        annuitant_ratio,
        liability_per_active,
        liability_per_retiree,
        db_size_category,
        rejected_fields,
    }
}

pub struct MasterSubsystem {
    config: PipelineConfig,
}

impl MasterSubsystem {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl PipelineStage for MasterSubsystem {
    type Input<'a> = Vec<ValidatedPlanRecord>;
    type Output = Vec<MasterPlanRecord>;

    fn name(&self) -> &'static str {
        "master"
    }

    fn run(
        &self,
        validated: Self::Input<'_>,
        _events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<MasterPlanRecord>> {
        let master: Vec<MasterPlanRecord> = validated
            .into_iter()
            .map(|v| build_master_record(v, &self.config))
            .collect();
        log::debug!("master: {} plan rows built", master.len());
        Ok(master)
    }
}
