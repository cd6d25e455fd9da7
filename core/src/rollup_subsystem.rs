//! Sponsor rollup aggregator (stage 5).
//!
//! Groups master rows by `ein` and produces one sponsor row per group,
//! sorted for outreach prioritization.
//!
//! Within a sponsor, each distinct `(ein, plan_num)` pair is one plan.
//! When several rows share a pair (duplicate schedule filings), the row
//! with the best `merge_quality` represents the plan in every sum; ties
//! go to the lexically earliest `ack_id`. The others are only counted.
//!
//! Rows without an `ein` cannot be attributed to a sponsor and are left
//! out; the run summary reports how many there were.

use crate::{
    config::PipelineConfig,
    error::PipelineResult,
    event::PipelineEvent,
    master_subsystem::{MasterPlanRecord, MergeQuality},
    subsystem::PipelineStage,
    types::{Derived, Ein, Field},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorRollupRecord {
    pub ein: Ein,
    /// First non-empty sponsor name in master order.
    pub sponsor_name: Option<String>,
    pub industry_sector: Option<String>,
    /// Distinct plan numbers, ascending.
    pub plan_numbers: Vec<String>,
    /// Distinct `(ein, plan_num)` pairs.
    pub plan_count: usize,
    /// Plans whose representative row has `merge_quality = None`.
    pub unverified_plan_count: usize,
    /// Rows beyond the first for a pair.
    pub duplicate_filing_count: usize,

    pub liability_active: Derived<f64>,
    pub liability_retired: Derived<f64>,
    pub liability_terminated: Derived<f64>,
    pub liability_total: Derived<f64>,
    pub active_participants: Derived<u64>,
    pub terminated_participants: Derived<u64>,
    pub total_participants: Derived<u64>,
    /// Sum of retired participants.
    pub annuitant_exposure: Derived<u64>,
}

/// Running sum over present values only. Stays undefined until the
/// first present value arrives.
#[derive(Debug, Clone, Copy, Default)]
struct PresentSum<T> {
    sum: Option<T>,
}

impl PresentSum<f64> {
    fn add(&mut self, field: &Field<f64>) {
        if let Some(v) = field.value() {
            self.sum = Some(self.sum.unwrap_or(0.0) + v);
        }
    }

    fn finish(self) -> Derived<f64> {
        match self.sum {
            Some(v) if v.is_finite() => Derived::Value(v),
            _ => Derived::Undefined,
        }
    }
}

impl PresentSum<u64> {
    fn add(&mut self, field: &Field<u64>) {
        if let Some(v) = field.value() {
            self.sum = Some(self.sum.unwrap_or(0).saturating_add(v));
        }
    }

    fn finish(self) -> Derived<u64> {
        self.sum.map_or(Derived::Undefined, Derived::Value)
    }
}

/// Best row first: higher quality, then earliest `ack_id`.
fn representative<'a>(rows: &[&'a MasterPlanRecord]) -> Option<&'a MasterPlanRecord> {
    rows.iter().copied().min_by(|a, b| {
        b.merge_quality
            .rank()
            .cmp(&a.merge_quality.rank())
            .then_with(|| a.ack_id.cmp(&b.ack_id))
    })
}

pub fn rollup_sponsor(ein: &str, rows: &[&MasterPlanRecord], config: &PipelineConfig) -> SponsorRollupRecord {
    // plan_num → rows; a missing plan_num is its own pair.
    let mut plans: BTreeMap<Option<&str>, Vec<&MasterPlanRecord>> = BTreeMap::new();
    for row in rows {
        plans.entry(row.plan_num.as_deref()).or_default().push(*row);
    }

    let mut liability_active = PresentSum::<f64>::default();
    let mut liability_retired = PresentSum::<f64>::default();
    let mut liability_terminated = PresentSum::<f64>::default();
    let mut liability_total = PresentSum::<f64>::default();
    let mut active = PresentSum::<u64>::default();
    let mut retired = PresentSum::<u64>::default();
    let mut terminated = PresentSum::<u64>::default();
    let mut total = PresentSum::<u64>::default();
    let mut unverified_plan_count = 0;
    let mut duplicate_filing_count = 0;

    for pair_rows in plans.values() {
        duplicate_filing_count += pair_rows.len().saturating_sub(1);
        let Some(rep) = representative(pair_rows) else {
            continue;
        };
        let verified = rep.merge_quality.is_verified();
        if !verified {
            unverified_plan_count += 1;
            if config.exclude_unverified_from_sums {
                continue;
            }
        }
        liability_active.add(&rep.liability_active);
        liability_retired.add(&rep.liability_retired);
        liability_terminated.add(&rep.liability_terminated);
        liability_total.add(&rep.liability_total);
        active.add(&rep.active_count);
        retired.add(&rep.retired_count);
        terminated.add(&rep.terminated_count);
        total.add(&rep.total_participants);
    }

    SponsorRollupRecord {
        ein: ein.to_string(),
        sponsor_name: rows.iter().find_map(|r| r.sponsor_name.clone()),
        industry_sector: rows.iter().find_map(|r| r.industry_sector.clone()),
        plan_numbers: plans.keys().flatten().map(|p| p.to_string()).collect(),
        plan_count: plans.len(),
        unverified_plan_count,
        duplicate_filing_count,
        liability_active: liability_active.finish(),
        liability_retired: liability_retired.finish(),
        liability_terminated: liability_terminated.finish(),
        liability_total: liability_total.finish(),
        active_participants: active.finish(),
        terminated_participants: terminated.finish(),
        total_participants: total.finish(),
        annuitant_exposure: retired.finish(),
    }
}

/// Descending with undefined values last.
fn desc_defined<T: PartialOrd + Copy>(a: Derived<T>, b: Derived<T>) -> Ordering {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Outreach order: total liability desc, total participants desc,
/// sponsor name asc (unnamed last), then `ein` so the order is total.
pub fn outreach_order(a: &SponsorRollupRecord, b: &SponsorRollupRecord) -> Ordering {
    desc_defined(a.liability_total, b.liability_total)
        .then_with(|| desc_defined(a.total_participants, b.total_participants))
        .then_with(|| match (&a.sponsor_name, &b.sponsor_name) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.ein.cmp(&b.ein))
}

pub struct RollupSubsystem {
    config: PipelineConfig,
}

impl RollupSubsystem {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl PipelineStage for RollupSubsystem {
    type Input<'a> = &'a [MasterPlanRecord];
    type Output = Vec<SponsorRollupRecord>;

    fn name(&self) -> &'static str {
        "rollup"
    }

    fn run(
        &self,
        master: Self::Input<'_>,
        _events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<SponsorRollupRecord>> {
        let mut by_ein: BTreeMap<&str, Vec<&MasterPlanRecord>> = BTreeMap::new();
        for row in master {
            if let Some(ein) = row.ein.as_deref() {
                by_ein.entry(ein).or_default().push(row);
            }
        }

        let mut rollup: Vec<SponsorRollupRecord> = by_ein
            .iter()
            .map(|(ein, rows)| rollup_sponsor(ein, rows, &self.config))
            .collect();
        rollup.sort_by(outreach_order);

        log::debug!(
            "rollup: {} sponsors from {} plan rows",
            rollup.len(),
            master.len()
        );
        Ok(rollup)
    }
}

/// Rows in the master table that carry no `ein`.
pub fn unattributed_rows(master: &[MasterPlanRecord]) -> usize {
    master.iter().filter(|r| r.ein.is_none()).count()
}

/// Rows whose quality keeps them out of sponsor sums under this config.
pub fn excluded_from_sums(master: &[MasterPlanRecord], config: &PipelineConfig) -> usize {
    if !config.exclude_unverified_from_sums {
        return 0;
    }
    master
        .iter()
        .filter(|r| r.merge_quality == MergeQuality::None)
        .count()
}
