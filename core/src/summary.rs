//! Run summary: what happened to every row, attached to every run.

use crate::{
    config::PipelineConfig,
    master_subsystem::MasterPlanRecord,
    normalizer_subsystem::{BatchKind, NormalizedBatches},
    rollup_subsystem::{excluded_from_sums, unattributed_rows, SponsorRollupRecord},
    types::RunId,
    validation_subsystem::AlignmentReport,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub schedule_rows_in: usize,
    pub filing_rows_in: usize,
    pub schedule_rows_rejected: usize,
    pub filing_rows_rejected: usize,
    /// Rejection reason code → row count, both batches.
    pub rejection_reasons: BTreeMap<String, usize>,
    pub master_rows: usize,
    pub sponsor_rows: usize,
    /// Master rows with no `ein`, absent from the rollup.
    pub unattributed_rows: usize,
    /// Master rows kept out of sponsor sums as unverified.
    pub excluded_from_sums: usize,
    pub merge_status_counts: BTreeMap<String, usize>,
    pub flag_counts: BTreeMap<String, usize>,
    pub merge_quality_counts: BTreeMap<String, usize>,
    pub size_category_counts: BTreeMap<String, usize>,
    pub alignment: AlignmentReport,
}

fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

impl RunSummary {
    pub fn build(
        run_id: &str,
        schedule_rows_in: usize,
        filing_rows_in: usize,
        normalized: &NormalizedBatches,
        alignment: AlignmentReport,
        master: &[MasterPlanRecord],
        rollup: &[SponsorRollupRecord],
        config: &PipelineConfig,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            schedule_rows_in,
            filing_rows_in,
            schedule_rows_rejected: normalized.rejected_count(BatchKind::Schedule),
            filing_rows_rejected: normalized.rejected_count(BatchKind::Filing),
            rejection_reasons: tally(normalized.rejections.iter().map(|r| r.error.code())),
            master_rows: master.len(),
            sponsor_rows: rollup.len(),
            unattributed_rows: unattributed_rows(master),
            excluded_from_sums: excluded_from_sums(master, config),
            merge_status_counts: tally(master.iter().map(|r| r.merge_status.as_str())),
            flag_counts: tally(master.iter().flat_map(|r| r.flags.iter().map(|f| f.as_str()))),
            merge_quality_counts: tally(master.iter().map(|r| r.merge_quality.as_str())),
            size_category_counts: tally(master.iter().map(|r| r.db_size_category.as_str())),
            alignment,
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.schedule_rows_rejected + self.filing_rows_rejected
    }
}

fn write_counts(f: &mut fmt::Formatter<'_>, title: &str, counts: &BTreeMap<String, usize>) -> fmt::Result {
    writeln!(f, "  {title}:")?;
    if counts.is_empty() {
        return writeln!(f, "    (none)");
    }
    for (key, n) in counts {
        writeln!(f, "    {key:<34} {n}")?;
    }
    Ok(())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run Summary ({}):", self.run_id)?;
        writeln!(
            f,
            "  Schedule rows: {} in, {} rejected",
            self.schedule_rows_in, self.schedule_rows_rejected
        )?;
        writeln!(
            f,
            "  Filing rows:   {} in, {} rejected",
            self.filing_rows_in, self.filing_rows_rejected
        )?;
        writeln!(f, "  Master rows:   {}", self.master_rows)?;
        writeln!(f, "  Sponsors:      {}", self.sponsor_rows)?;
        writeln!(f, "  Unattributed (no EIN): {}", self.unattributed_rows)?;
        writeln!(f, "  Excluded from sums:    {}", self.excluded_from_sums)?;
        write_counts(f, "Rejection reasons", &self.rejection_reasons)?;
        write_counts(f, "Merge status", &self.merge_status_counts)?;
        write_counts(f, "Validation flags", &self.flag_counts)?;
        write_counts(f, "Merge quality", &self.merge_quality_counts)?;
        write_counts(f, "Size category", &self.size_category_counts)?;

        let a = &self.alignment;
        writeln!(f, "  Alignment:")?;
        writeln!(
            f,
            "    ack_id overlap: {} of {} schedule ack_ids ({:.1}%), {} filing ack_ids",
            a.ack_matches, a.schedule_ack_unique, a.ack_match_pct, a.filing_ack_unique
        )?;
        if let Some((lo, hi)) = a.schedule_date_range {
            writeln!(f, "    schedule filing dates: {lo} to {hi}")?;
        }
        if let Some((lo, hi)) = a.filing_date_range {
            writeln!(f, "    filing dates:          {lo} to {hi}")?;
        }
        writeln!(f, "    {}", a.diagnosis)
    }
}
