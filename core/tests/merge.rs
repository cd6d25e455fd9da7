//! Integration tests for the merge engine.
//!
//! Tests verify:
//! 1. Primary key match with secondary cross-verification
//! 2. Secondary mismatch is flagged, never dropped
//! 3. Fallback on (ein, plan_num) and its documented tie-break
//! 4. Unmatched schedules keep filing fields absent
//! 5. Exactly one merged record per schedule record

use pension_recon_core::{
    event::PipelineEvent,
    merge_subsystem::{
        pick_fallback_candidate, MatchBasis, MergeStatus, MergeSubsystem, MergedPlanRecord,
    },
    normalizer_subsystem::{NormalizerSubsystem, RawFilingRow, RawScheduleRow},
    subsystem::PipelineStage,
};

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

/// Normalize both batches and merge them.
fn merge(
    schedules: Vec<RawScheduleRow>,
    filings: Vec<RawFilingRow>,
) -> (Vec<MergedPlanRecord>, Vec<PipelineEvent>) {
    let mut events = Vec::new();
    let normalized = NormalizerSubsystem::new()
        .run((schedules.as_slice(), filings.as_slice()), &mut events)
        .expect("normalize");
    let merged = MergeSubsystem::new()
        .run(
            (normalized.schedules.as_slice(), normalized.filings.as_slice()),
            &mut events,
        )
        .expect("merge");
    (merged, events)
}

// ─────────────────────────────────────────────────────────────────────────────
// Primary key
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn primary_match_with_agreeing_secondary_is_matched() {
    // Scenario A inputs.
    let (merged, _) = merge(
        vec![schedule("1", "11", "01")],
        vec![filing("1", "11", "01", "Acme")],
    );
    assert_eq!(merged.len(), 1);
    let m = &merged[0];
    assert_eq!(m.merge_status, MergeStatus::Matched);
    assert_eq!(m.match_basis, MatchBasis::PrimaryAndSecondary);
    assert_eq!(m.sponsor_name(), Some("Acme"));
    assert_eq!(m.candidate_count, 1);
}

#[test]
fn secondary_mismatch_is_flagged_not_dropped() {
    let (merged, _) = merge(
        vec![schedule("1", "11", "01")],
        vec![filing("1", "11", "02", "Acme")],
    );
    let m = &merged[0];
    assert_eq!(m.merge_status, MergeStatus::PrimaryMatchSecondaryMismatch);
    assert_eq!(m.match_basis, MatchBasis::Primary);
    assert_eq!(m.filing.as_ref().and_then(|f| f.ack_id.as_deref()), Some("1"));
}

#[test]
fn unverifiable_secondary_counts_as_mismatch() {
    let (merged, _) = merge(
        vec![RawScheduleRow { ein: None, ..schedule("1", "", "01") }],
        vec![filing("1", "11", "01", "Acme")],
    );
    assert_eq!(merged[0].merge_status, MergeStatus::PrimaryMatchSecondaryMismatch);
}

#[test]
fn padding_differences_do_not_break_secondary_agreement() {
    let (merged, _) = merge(
        vec![schedule("1", "12-3456789", "1")],
        vec![filing("1", "123456789", "001", "Acme")],
    );
    assert_eq!(merged[0].merge_status, MergeStatus::Matched);
}

// ─────────────────────────────────────────────────────────────────────────────
// Fallback
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn single_secondary_candidate_is_fallback_matched() {
    let (merged, _) = merge(
        vec![schedule("S1", "22", "01")],
        vec![filing("F1", "22", "01", "Beta")],
    );
    let m = &merged[0];
    assert_eq!(m.merge_status, MergeStatus::FallbackMatched);
    assert_eq!(m.match_basis, MatchBasis::Fallback);
    assert_eq!(m.sponsor_name(), Some("Beta"));
}

#[test]
fn ambiguous_fallback_picks_earliest_ack_id() {
    // Scenario C: two filings share (22, 01), no periods on either side.
    let (merged, _) = merge(
        vec![schedule("S1", "22", "01")],
        vec![
            filing("F-B", "22", "01", "Beta Two"),
            filing("F-A", "22", "01", "Beta One"),
        ],
    );
    let m = &merged[0];
    assert_eq!(m.merge_status, MergeStatus::FallbackAmbiguous);
    assert_eq!(m.candidate_count, 2);
    assert_eq!(m.filing.as_ref().and_then(|f| f.ack_id.as_deref()), Some("FA"));
    assert_eq!(m.sponsor_name(), Some("Beta One"));
}

#[test]
fn ambiguous_fallback_prefers_closest_reporting_period() {
    let sched = RawScheduleRow {
        plan_year_begin: cell("2022-01-01"),
        ..schedule("S1", "22", "01")
    };
    let older = RawFilingRow {
        plan_year_begin: cell("2021-01-01"),
        ..filing("A1", "22", "01", "Old")
    };
    let closer = RawFilingRow {
        plan_year_begin: cell("2022-01-01"),
        ..filing("B1", "22", "01", "Current")
    };
    let undated = filing("A0", "22", "01", "Undated");
    let (merged, _) = merge(vec![sched], vec![older, undated, closer]);
    assert_eq!(merged[0].merge_status, MergeStatus::FallbackAmbiguous);
    assert_eq!(merged[0].sponsor_name(), Some("Current"));
}

#[test]
fn tie_break_is_independent_of_filing_order() {
    let mut a = filing("F2", "22", "01", "Second");
    a.plan_year = cell("2022");
    let mut b = filing("F1", "22", "01", "First");
    b.plan_year = cell("2022");

    let (forward, _) = merge(vec![schedule("S1", "22", "01")], vec![a.clone(), b.clone()]);
    let (reverse, _) = merge(vec![schedule("S1", "22", "01")], vec![b, a]);
    assert_eq!(forward[0].sponsor_name(), Some("First"));
    assert_eq!(reverse[0].sponsor_name(), Some("First"));
}

#[test]
fn filing_without_ack_id_still_matches_by_fallback() {
    let (merged, events) = merge(
        vec![schedule("S1", "22", "01")],
        vec![RawFilingRow { ack_id: None, ..filing("", "22", "01", "Beta") }],
    );
    let m = &merged[0];
    assert_eq!(m.merge_status, MergeStatus::FallbackMatched);
    assert_eq!(m.sponsor_name(), Some("Beta"));
    assert_eq!(m.filing.as_ref().and_then(|f| f.ack_id.as_deref()), None);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::RowRejected { batch, .. } if batch == "filing"
    )));
}

#[test]
fn keyed_filing_wins_tie_over_keyless_one() {
    let keyless = RawFilingRow { ack_id: cell("  "), ..filing("", "22", "01", "No Ack") };
    let keyed = filing("ZZZ", "22", "01", "Keyed");
    let (forward, _) = merge(vec![schedule("S1", "22", "01")], vec![keyless.clone(), keyed.clone()]);
    let (reverse, _) = merge(vec![schedule("S1", "22", "01")], vec![keyed, keyless]);
    assert_eq!(forward[0].merge_status, MergeStatus::FallbackAmbiguous);
    assert_eq!(forward[0].sponsor_name(), Some("Keyed"));
    assert_eq!(reverse[0].sponsor_name(), Some("Keyed"));
}

#[test]
fn pick_fallback_candidate_on_empty_slice_is_none() {
    assert!(pick_fallback_candidate(None, &[]).is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Unmatched and cardinality
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unmatched_schedule_keeps_filing_fields_absent() {
    // Scenario B.
    let (merged, _) = merge(
        vec![schedule("2", "33", "01")],
        vec![filing("1", "11", "01", "Acme")],
    );
    let m = &merged[0];
    assert_eq!(m.merge_status, MergeStatus::Unmatched);
    assert_eq!(m.match_basis, MatchBasis::None);
    assert!(m.filing.is_none());
    assert_eq!(m.sponsor_name(), None);
    assert_eq!(m.candidate_count, 0);
}

#[test]
fn schedule_without_secondary_key_cannot_fall_back() {
    let (merged, _) = merge(
        vec![RawScheduleRow { plan_num: None, ..schedule("S1", "22", "") }],
        vec![filing("F1", "22", "01", "Beta")],
    );
    assert_eq!(merged[0].merge_status, MergeStatus::Unmatched);
}

#[test]
fn one_merged_record_per_schedule_record() {
    let schedules = vec![
        schedule("1", "11", "01"),
        schedule("1", "11", "01"), // duplicate schedule filing
        schedule("2", "33", "01"),
        schedule("S1", "22", "01"),
    ];
    let filings = vec![
        filing("1", "11", "01", "Acme"),
        filing("F1", "22", "01", "Beta"),
        filing("ORPHAN", "99", "01", "Nobody"),
    ];
    let (merged, events) = merge(schedules, filings);

    assert_eq!(merged.len(), 4);
    let acks: Vec<&str> = merged.iter().map(|m| m.schedule.ack_id.as_str()).collect();
    assert_eq!(acks, vec!["1", "1", "2", "S1"]);
    assert!(merged
        .iter()
        .all(|m| m.filing.as_ref().map_or(true, |f| f.ack_id.as_deref() != Some("ORPHAN"))));

    let resolved = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::MergeResolved { .. }))
        .count();
    assert_eq!(resolved, 4);
}

#[test]
fn duplicate_filing_ack_keeps_first_and_reports() {
    let (merged, events) = merge(
        vec![schedule("1", "11", "01")],
        vec![
            filing("1", "11", "01", "First"),
            filing("1", "11", "01", "Second"),
        ],
    );
    assert_eq!(merged[0].sponsor_name(), Some("First"));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::DuplicateFilingAck { ack_id, row_index: 1 } if ack_id == "1"
    )));
}
