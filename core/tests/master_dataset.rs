//! Integration tests for the master dataset builder.
//!
//! The derived metrics must never turn a missing or zero denominator
//! into a number. merge_quality follows the documented table.

use pension_recon_core::{
    config::{DbSizeCategory, PipelineConfig, SizeBand},
    engine::run_pipeline,
    master_subsystem::{merge_quality, MasterPlanRecord, MergeQuality},
    merge_subsystem::MergeStatus,
    normalizer_subsystem::{RawFilingRow, RawScheduleRow},
    types::{Derived, Field},
    validation_subsystem::ValidationFlag,
};
use std::collections::BTreeSet;

fn cell(v: &str) -> Option<String> {
    Some(v.to_string())
}

fn schedule(ack: &str, ein: &str, plan: &str) -> RawScheduleRow {
    RawScheduleRow {
        ack_id: cell(ack),
        ein: cell(ein),
        plan_num: cell(plan),
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

fn master_with(config: &PipelineConfig, schedules: Vec<RawScheduleRow>, filings: Vec<RawFilingRow>) -> Vec<MasterPlanRecord> {
    run_pipeline(config, "master-test", &schedules, &filings)
        .expect("pipeline run")
        .master
}

fn master(schedules: Vec<RawScheduleRow>, filings: Vec<RawFilingRow>) -> Vec<MasterPlanRecord> {
    master_with(&PipelineConfig::default_test(), schedules, filings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived metrics
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn scenario_a_annuitant_ratio() {
    let rows = master(
        vec![RawScheduleRow {
            active_count: cell("100"),
            retired_count: cell("50"),
            total_participants: cell("150"),
            ..schedule("1", "11", "01")
        }],
        vec![filing("1", "11", "01", "Acme")],
    );
    let r = &rows[0];
    assert_eq!(r.merge_status, MergeStatus::Matched);
    assert_eq!(r.merge_quality, MergeQuality::High);
    let ratio = r.annuitant_ratio.value().expect("ratio defined");
    assert!((ratio - 1.0 / 3.0).abs() < 1e-12, "got {ratio}");
    assert_eq!(r.sponsor_name.as_deref(), Some("Acme"));
}

#[test]
fn zero_or_missing_denominators_are_undefined() {
    let rows = master(
        vec![
            RawScheduleRow {
                active_count: cell("0"),
                retired_count: cell("0"),
                total_participants: cell("0"),
                liability_active: cell("500"),
                liability_retired: cell("500"),
                actuary_firm: cell("Aon"),
                ..schedule("Z", "11", "01")
            },
            RawScheduleRow {
                liability_active: cell("500"),
                retired_count: cell("garbage"),
                liability_retired: cell("500"),
                actuary_firm: cell("Aon"),
                ..schedule("M", "11", "02")
            },
        ],
        vec![filing("Z", "11", "01", "Acme")],
    );
    for r in &rows {
        assert_eq!(r.annuitant_ratio, Derived::Undefined, "{}", r.ack_id);
        assert_eq!(r.liability_per_active, Derived::Undefined, "{}", r.ack_id);
        assert_eq!(r.liability_per_retiree, Derived::Undefined, "{}", r.ack_id);
    }
    assert_eq!(rows[1].retired_count, Field::Rejected("garbage".to_string()));
}

#[test]
fn per_head_liabilities_divide_by_their_own_counts() {
    let rows = master(
        vec![RawScheduleRow {
            active_count: cell("200"),
            retired_count: cell("50"),
            total_participants: cell("250"),
            liability_active: cell("1,000,000"),
            liability_retired: cell("2,000,000"),
            actuary_firm: cell("Segal"),
            ..schedule("1", "11", "01")
        }],
        vec![filing("1", "11", "01", "Acme")],
    );
    assert_eq!(rows[0].liability_per_active, Derived::Value(5_000.0));
    assert_eq!(rows[0].liability_per_retiree, Derived::Value(40_000.0));
    assert_eq!(rows[0].annuitant_ratio, Derived::Value(0.2));
}

// ─────────────────────────────────────────────────────────────────────────────
// Size category
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn size_category_follows_threshold_table() {
    let config = PipelineConfig::default_test();
    assert_eq!(config.size_category(None), DbSizeCategory::Unknown);
    assert_eq!(config.size_category(Some(0)), DbSizeCategory::Small);
    assert_eq!(config.size_category(Some(999)), DbSizeCategory::Small);
    assert_eq!(config.size_category(Some(1_000)), DbSizeCategory::Mid);
    assert_eq!(config.size_category(Some(49_999)), DbSizeCategory::Large);
    assert_eq!(config.size_category(Some(50_000)), DbSizeCategory::Jumbo);
}

#[test]
fn size_thresholds_are_configurable() {
    let config = PipelineConfig {
        size_bands: vec![
            SizeBand { category: DbSizeCategory::Small, min_participants: 0 },
            SizeBand { category: DbSizeCategory::Jumbo, min_participants: 100 },
        ],
        ..PipelineConfig::default_test()
    };
    assert!(config.validate().is_ok());
    let rows = master_with(
        &config,
        vec![
            RawScheduleRow { total_participants: cell("150"), ..schedule("1", "11", "01") },
            RawScheduleRow { total_participants: cell("n/a"), ..schedule("2", "11", "02") },
        ],
        vec![filing("1", "11", "01", "Acme")],
    );
    assert_eq!(rows[0].db_size_category, DbSizeCategory::Jumbo);
    assert_eq!(rows[1].db_size_category, DbSizeCategory::Unknown);
}

#[test]
fn malformed_threshold_tables_are_refused() {
    let mut config = PipelineConfig::default_test();
    config.size_bands.swap(1, 2);
    assert!(config.validate().is_err());

    let mut config = PipelineConfig::default_test();
    config.size_bands[0].min_participants = 10;
    assert!(config.validate().is_err());

    let mut config = PipelineConfig::default_test();
    config.size_bands.clear();
    assert!(config.validate().is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// merge_quality
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn merge_quality_table() {
    let clean = BTreeSet::new();
    let flagged = BTreeSet::from([ValidationFlag::MissingActuary]);

    let cases = [
        (MergeStatus::Matched, &clean, MergeQuality::High),
        (MergeStatus::Matched, &flagged, MergeQuality::Medium),
        (MergeStatus::FallbackMatched, &clean, MergeQuality::Medium),
        (MergeStatus::FallbackMatched, &flagged, MergeQuality::Low),
        (MergeStatus::PrimaryMatchSecondaryMismatch, &clean, MergeQuality::Low),
        (MergeStatus::FallbackAmbiguous, &clean, MergeQuality::Low),
        (MergeStatus::Unmatched, &clean, MergeQuality::None),
        (MergeStatus::Unmatched, &flagged, MergeQuality::None),
    ];
    for (status, flags, expected) in cases {
        assert_eq!(merge_quality(status, flags), expected, "{status:?} {flags:?}");
    }
}

#[test]
fn unmatched_row_has_no_filing_fields() {
    // Scenario B.
    let rows = master(
        vec![RawScheduleRow { liability_total: cell("1000"), ..schedule("2", "33", "01") }],
        vec![filing("1", "11", "01", "Acme")],
    );
    let r = &rows[0];
    assert_eq!(r.merge_status, MergeStatus::Unmatched);
    assert_eq!(r.merge_quality, MergeQuality::None);
    assert_eq!(r.filing_ack_id, None);
    assert_eq!(r.sponsor_name, None);
    assert_eq!(r.industry_sector, None);
}

#[test]
fn master_rows_keep_schedule_order() {
    let rows = master(
        vec![schedule("C", "11", "03"), schedule("A", "11", "01"), schedule("B", "11", "02")],
        vec![filing("A", "11", "01", "Acme")],
    );
    let acks: Vec<&str> = rows.iter().map(|r| r.ack_id.as_str()).collect();
    assert_eq!(acks, vec!["C", "A", "B"]);
}

#[test]
fn undefined_serializes_as_explicit_marker() {
    let json = serde_json::to_string(&Derived::<f64>::Undefined).unwrap();
    assert_eq!(json, r#"{"state":"undefined"}"#);
    let json = serde_json::to_string(&Field::<u64>::Absent).unwrap();
    assert_eq!(json, r#"{"state":"absent"}"#);
}
