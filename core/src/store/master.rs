use super::{json_column, sql_count_opt, MasterPlanRow, ReconStore};
use crate::{error::PipelineResult, master_subsystem::MasterPlanRecord};
use rusqlite::params;

impl ReconStore {
    pub(super) fn insert_master_row(
        &self,
        run_id: &str,
        seq: usize,
        r: &MasterPlanRecord,
    ) -> PipelineResult<()> {
        let flags: Vec<&str> = r.flags.iter().map(|f| f.as_str()).collect();
        let flags_json = serde_json::to_string(&flags)?;
        let rejected_json = serde_json::to_string(&r.rejected_fields)?;
        let active_count = sql_count_opt("active_count", r.active_count.value())?;
        let retired_count = sql_count_opt("retired_count", r.retired_count.value())?;
        let terminated_count = sql_count_opt("terminated_count", r.terminated_count.value())?;
        let total_participants = sql_count_opt("total_participants", r.total_participants.value())?;

        self.conn.execute(
            "INSERT INTO master_plan (
                run_id, seq, ack_id, ein, plan_num, plan_year, reporting_period,
                filing_date, filing_ack_id, plan_name, sponsor_name, business_code,
                industry_sector, active_count, retired_count, terminated_count,
                total_participants, liability_active, liability_retired,
                liability_terminated, liability_total, effective_interest_rate,
                segment_rate_1, segment_rate_2, segment_rate_3, segment_rate_type,
                mortality_code, actuary_name, actuary_firm, actuary_city, actuary_state,
                merge_status, match_basis, candidate_count, merge_quality, flags,
                annuitant_ratio, liability_per_active, liability_per_retiree,
                db_size_category, rejected_fields
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,
                      ?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34,?35,?36,?37,
                      ?38,?39,?40,?41)",
            params![
                run_id,
                seq as i64,
                r.ack_id,
                r.ein,
                r.plan_num,
                r.plan_year.value().map(i64::from),
                r.reporting_period.map(|d| d.to_string()),
                r.filing_date.map(|d| d.to_string()),
                r.filing_ack_id,
                r.plan_name,
                r.sponsor_name,
                r.business_code,
                r.industry_sector,
                active_count,
                retired_count,
                terminated_count,
                total_participants,
                r.liability_active.value(),
                r.liability_retired.value(),
                r.liability_terminated.value(),
                r.liability_total.value(),
                r.effective_interest_rate.value(),
                r.segment_rates[0].value(),
                r.segment_rates[1].value(),
                r.segment_rates[2].value(),
                r.segment_rate_type.as_str(),
                r.mortality_code.as_str(),
                r.actuary_name,
                r.actuary_firm,
                r.actuary_city,
                r.actuary_state,
                r.merge_status.as_str(),
                r.match_basis.as_str(),
                r.candidate_count as i64,
                r.merge_quality.as_str(),
                flags_json,
                r.annuitant_ratio.value(),
                r.liability_per_active.value(),
                r.liability_per_retiree.value(),
                r.db_size_category.as_str(),
                rejected_json,
            ],
        )?;
        Ok(())
    }

    /// The published master plan table of a run, in table order.
    pub fn master_rows(&self, run_id: &str) -> PipelineResult<Vec<MasterPlanRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, seq, ack_id, ein, plan_num, plan_year, reporting_period,
                    filing_date, filing_ack_id, plan_name, sponsor_name, business_code,
                    industry_sector, active_count, retired_count, terminated_count,
                    total_participants, liability_active, liability_retired,
                    liability_terminated, liability_total, effective_interest_rate,
                    segment_rate_1, segment_rate_2, segment_rate_3, segment_rate_type,
                    mortality_code, actuary_name, actuary_firm, actuary_city, actuary_state,
                    merge_status, match_basis, candidate_count, merge_quality, flags,
                    annuitant_ratio, liability_per_active, liability_per_retiree,
                    db_size_category, rejected_fields
             FROM master_plan WHERE run_id = ?1
             ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(MasterPlanRow {
                    run_id: row.get(0)?,
                    seq: row.get::<_, i64>(1)? as usize,
                    ack_id: row.get(2)?,
                    ein: row.get(3)?,
                    plan_num: row.get(4)?,
                    plan_year: row.get(5)?,
                    reporting_period: row.get(6)?,
                    filing_date: row.get(7)?,
                    filing_ack_id: row.get(8)?,
                    plan_name: row.get(9)?,
                    sponsor_name: row.get(10)?,
                    business_code: row.get(11)?,
                    industry_sector: row.get(12)?,
                    active_count: row.get(13)?,
                    retired_count: row.get(14)?,
                    terminated_count: row.get(15)?,
                    total_participants: row.get(16)?,
                    liability_active: row.get(17)?,
                    liability_retired: row.get(18)?,
                    liability_terminated: row.get(19)?,
                    liability_total: row.get(20)?,
                    effective_interest_rate: row.get(21)?,
                    segment_rate_1: row.get(22)?,
                    segment_rate_2: row.get(23)?,
                    segment_rate_3: row.get(24)?,
                    segment_rate_type: row.get(25)?,
                    mortality_code: row.get(26)?,
                    actuary_name: row.get(27)?,
                    actuary_firm: row.get(28)?,
                    actuary_city: row.get(29)?,
                    actuary_state: row.get(30)?,
                    merge_status: row.get(31)?,
                    match_basis: row.get(32)?,
                    candidate_count: row.get(33)?,
                    merge_quality: row.get(34)?,
                    flags: json_column(row, 35)?,
                    annuitant_ratio: row.get(36)?,
                    liability_per_active: row.get(37)?,
                    liability_per_retiree: row.get(38)?,
                    db_size_category: row.get(39)?,
                    rejected_fields: json_column(row, 40)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_master_rows(&self, run_id: &str) -> PipelineResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM master_plan WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
