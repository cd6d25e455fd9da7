//! Integration tests for the sponsor rollup aggregator.
//!
//! Tests verify:
//! 1. plan_count equals the distinct (ein, plan_num) pairs
//! 2. Unverified plans are counted but kept out of sums by default
//! 3. All-absent sums are undefined, never zero
//! 4. Outreach ordering and its tie-breaks

use pension_recon_core::{
    config::PipelineConfig,
    engine::{run_pipeline, PipelineOutput},
    normalizer_subsystem::{RawFilingRow, RawScheduleRow},
    rollup_subsystem::SponsorRollupRecord,
    types::Derived,
};

fn cell(v: &str) -> Option<String> {
    Some(v.to_string())
}

/// A schedule row with liabilities, counts and an actuary.
fn plan(ack: &str, ein: &str, pn: &str, liability: &str, retired: &str, total: &str) -> RawScheduleRow {
    RawScheduleRow {
        ack_id: cell(ack),
        ein: cell(ein),
        plan_num: cell(pn),
        retired_count: cell(retired),
        total_participants: cell(total),
        liability_total: cell(liability),
        actuary_firm: cell("Mercer"),
        ..Default::default()
    }
}

fn filing(ack: &str, ein: &str, plan: &str, sponsor: &str) -> RawFilingRow {
    RawFilingRow {
        ack_id: cell(ack),
        ein: cell(ein),
        plan_num: cell(plan),
        sponsor_name: cell(sponsor),
        ..Default::default()
    }
}

fn run_with(config: &PipelineConfig, schedules: Vec<RawScheduleRow>, filings: Vec<RawFilingRow>) -> PipelineOutput {
    run_pipeline(config, "rollup-test", &schedules, &filings).expect("pipeline run")
}

fn run(schedules: Vec<RawScheduleRow>, filings: Vec<RawFilingRow>) -> PipelineOutput {
    run_with(&PipelineConfig::default_test(), schedules, filings)
}

fn sponsor<'a>(out: &'a PipelineOutput, ein: &str) -> &'a SponsorRollupRecord {
    out.rollup
        .iter()
        .find(|s| s.ein == ein)
        .unwrap_or_else(|| panic!("no rollup row for {ein}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Counting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn scenario_a_single_plan_sponsor() {
    let out = run(
        vec![RawScheduleRow {
            active_count: cell("100"),
            retired_count: cell("50"),
            total_participants: cell("150"),
            ..plan("1", "11", "01", "", "", "")
        }],
        vec![filing("1", "11", "01", "Acme")],
    );
    let s = sponsor(&out, "000000011");
    assert_eq!(s.plan_count, 1);
    assert_eq!(s.sponsor_name.as_deref(), Some("Acme"));
    assert_eq!(s.total_participants, Derived::Value(150));
    assert_eq!(s.annuitant_exposure, Derived::Value(50));
    assert_eq!(s.plan_numbers, vec!["001".to_string()]);
}

#[test]
fn plan_count_is_distinct_pairs_and_duplicates_sum_once() {
    let out = run(
        vec![
            plan("A", "11", "01", "1000", "10", "100"),
            plan("A", "11", "1", "1000", "10", "100"), // same plan filed twice
            plan("B", "11", "02", "500", "5", "50"),
        ],
        vec![filing("A", "11", "01", "Acme"), filing("B", "11", "02", "Acme")],
    );
    assert_eq!(out.master.len(), 3);
    let s = sponsor(&out, "000000011");
    assert_eq!(s.plan_count, 2);
    assert_eq!(s.duplicate_filing_count, 1);
    assert_eq!(s.plan_numbers, vec!["001".to_string(), "002".to_string()]);
    assert_eq!(s.liability_total, Derived::Value(1500.0));
    assert_eq!(s.total_participants, Derived::Value(150));
}

// ─────────────────────────────────────────────────────────────────────────────
// Unverified plans
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unverified_plan_counted_but_excluded_from_sums() {
    // Scenario B alongside a verified plan of the same sponsor.
    let schedules = vec![
        plan("1", "11", "01", "1000", "10", "100"),
        plan("2", "11", "02", "9999", "99", "999"),
    ];
    let filings = vec![filing("1", "11", "01", "Acme")];

    let out = run(schedules.clone(), filings.clone());
    let s = sponsor(&out, "000000011");
    assert_eq!(s.plan_count, 2);
    assert_eq!(s.unverified_plan_count, 1);
    assert_eq!(s.liability_total, Derived::Value(1000.0));
    assert_eq!(s.annuitant_exposure, Derived::Value(10));
    assert_eq!(out.summary.excluded_from_sums, 1);

    let inclusive = PipelineConfig {
        exclude_unverified_from_sums: false,
        ..PipelineConfig::default_test()
    };
    let out = run_with(&inclusive, schedules, filings);
    let s = sponsor(&out, "000000011");
    assert_eq!(s.plan_count, 2);
    assert_eq!(s.unverified_plan_count, 1);
    assert_eq!(s.liability_total, Derived::Value(10_999.0));
    assert_eq!(out.summary.excluded_from_sums, 0);
}

#[test]
fn sponsor_with_only_unverified_plans_has_undefined_sums() {
    let out = run(
        vec![plan("2", "33", "01", "1000", "10", "100")],
        vec![filing("1", "11", "01", "Acme")],
    );
    let s = sponsor(&out, "000000033");
    assert_eq!(s.plan_count, 1);
    assert_eq!(s.unverified_plan_count, 1);
    assert_eq!(s.liability_total, Derived::Undefined);
    assert_eq!(s.total_participants, Derived::Undefined);
    assert_eq!(s.sponsor_name, None);
}

#[test]
fn all_absent_liability_is_undefined_not_zero() {
    let out = run(
        vec![
            plan("1", "11", "01", "", "", "100"),
            plan("2", "11", "02", "N/A", "", "50"),
        ],
        vec![filing("1", "11", "01", "Acme"), filing("2", "11", "02", "Acme")],
    );
    let s = sponsor(&out, "000000011");
    assert_eq!(s.liability_total, Derived::Undefined);
    assert_eq!(s.annuitant_exposure, Derived::Undefined);
    assert_eq!(s.total_participants, Derived::Value(150));
}

#[test]
fn rows_without_ein_are_reported_not_rolled_up() {
    let out = run(
        vec![
            RawScheduleRow { ein: None, ..plan("1", "", "01", "100", "1", "10") },
            plan("2", "22", "01", "100", "1", "10"),
        ],
        vec![filing("1", "22", "09", "Acme"), filing("2", "22", "01", "Beta")],
    );
    assert_eq!(out.master.len(), 2);
    assert_eq!(out.rollup.len(), 1);
    assert_eq!(out.summary.unattributed_rows, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sorted_by_liability_then_participants_then_name() {
    let out = run(
        vec![
            plan("1", "1", "01", "100", "1", "10"),
            plan("2", "2", "01", "900", "1", "10"),
            plan("3", "3", "01", "100", "1", "20"),
            plan("4", "4", "01", "", "1", "99"),
            plan("5", "5", "01", "100", "1", "10"),
        ],
        vec![
            filing("1", "1", "01", "Zeta"),
            filing("2", "2", "01", "Mid"),
            filing("3", "3", "01", "Busy"),
            filing("4", "4", "01", "Unknown Liability"),
            filing("5", "5", "01", "Alpha"),
        ],
    );
    let names: Vec<&str> = out
        .rollup
        .iter()
        .map(|s| s.sponsor_name.as_deref().unwrap_or("-"))
        .collect();
    assert_eq!(names, vec!["Mid", "Busy", "Alpha", "Zeta", "Unknown Liability"]);
}

#[test]
fn first_non_empty_sponsor_name_represents_the_sponsor() {
    let out = run(
        vec![
            plan("1", "11", "01", "100", "1", "10"),
            plan("2", "11", "02", "100", "1", "10"),
        ],
        vec![
            RawFilingRow { sponsor_name: cell("  "), ..filing("1", "11", "01", "") },
            filing("2", "11", "02", "Acme Holdings"),
        ],
    );
    assert_eq!(sponsor(&out, "000000011").sponsor_name.as_deref(), Some("Acme Holdings"));
}
