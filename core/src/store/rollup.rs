use super::{json_column, sql_count_opt, ReconStore, SponsorRollupRow};
use crate::{error::PipelineResult, rollup_subsystem::SponsorRollupRecord};
use rusqlite::params;

impl ReconStore {
    pub(super) fn insert_sponsor_row(
        &self,
        run_id: &str,
        rank: usize,
        r: &SponsorRollupRecord,
    ) -> PipelineResult<()> {
        let plan_numbers_json = serde_json::to_string(&r.plan_numbers)?;
        let active = sql_count_opt("active_participants", r.active_participants.value())?;
        let terminated =
            sql_count_opt("terminated_participants", r.terminated_participants.value())?;
        let total = sql_count_opt("total_participants", r.total_participants.value())?;
        let annuitants = sql_count_opt("annuitant_exposure", r.annuitant_exposure.value())?;
        self.conn.execute(
            "INSERT INTO sponsor_rollup (
                run_id, outreach_rank, ein, sponsor_name, industry_sector, plan_numbers,
                plan_count, unverified_plan_count, duplicate_filing_count,
                liability_active, liability_retired, liability_terminated, liability_total,
                active_participants, terminated_participants, total_participants,
                annuitant_exposure
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                run_id,
                rank as i64,
                r.ein,
                r.sponsor_name,
                r.industry_sector,
                plan_numbers_json,
                r.plan_count as i64,
                r.unverified_plan_count as i64,
                r.duplicate_filing_count as i64,
                r.liability_active.value(),
                r.liability_retired.value(),
                r.liability_terminated.value(),
                r.liability_total.value(),
                active,
                terminated,
                total,
                annuitants,
            ],
        )?;
        Ok(())
    }

    /// The published sponsor rollup table of a run, in outreach order.
    pub fn sponsor_rows(&self, run_id: &str) -> PipelineResult<Vec<SponsorRollupRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, outreach_rank, ein, sponsor_name, industry_sector, plan_numbers,
                    plan_count, unverified_plan_count, duplicate_filing_count,
                    liability_active, liability_retired, liability_terminated, liability_total,
                    active_participants, terminated_participants, total_participants,
                    annuitant_exposure
             FROM sponsor_rollup WHERE run_id = ?1
             ORDER BY outreach_rank ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(SponsorRollupRow {
                    run_id: row.get(0)?,
                    rank: row.get::<_, i64>(1)? as usize,
                    ein: row.get(2)?,
                    sponsor_name: row.get(3)?,
                    industry_sector: row.get(4)?,
                    plan_numbers: json_column(row, 5)?,
                    plan_count: row.get(6)?,
                    unverified_plan_count: row.get(7)?,
                    duplicate_filing_count: row.get(8)?,
                    liability_active: row.get(9)?,
                    liability_retired: row.get(10)?,
                    liability_terminated: row.get(11)?,
                    liability_total: row.get(12)?,
                    active_participants: row.get(13)?,
                    terminated_participants: row.get(14)?,
                    total_participants: row.get(15)?,
                    annuitant_exposure: row.get(16)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn sponsor_row(&self, run_id: &str, ein: &str) -> PipelineResult<Option<SponsorRollupRow>> {
        Ok(self.sponsor_rows(run_id)?.into_iter().find(|r| r.ein == ein))
    }
}
