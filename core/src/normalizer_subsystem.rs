//! Field normalizer (stage 1).
//!
//! Turns untyped raw rows from both filing batches into typed records.
//! Every cell goes through an explicit, declared coercion rule:
//!   - identifiers: trimmed, stripped of non-alphanumeric noise, padded
//!   - numerics:    thousands separators tolerated, blanks → Absent,
//!                  garbage → Rejected (never zero)
//!   - categoricals: fixed lookup table, unrecognized → Unknown
//!
//! A schedule row without an ack_id is rejected and reported. A filing
//! row without one is reported the same way but kept for fallback
//! matching on `(ein, plan_num)`. Rejection never aborts the batch.

use crate::{
    error::{NormalizationError, PipelineResult},
    event::PipelineEvent,
    firm_names::canonical_firm_name,
    industry::naics_sector,
    subsystem::PipelineStage,
    types::{AckId, Ein, Field},
};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

// ── Raw input rows ────────────────────────────────────────────────

/// One actuarial-schedule row as handed over by the loading collaborator.
/// Column names accept both the canonical name and the regulatory
/// dataset headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawScheduleRow {
    #[serde(default, alias = "ACK_ID", alias = "SB_ACK_ID", deserialize_with = "cell")]
    pub ack_id: Option<String>,
    #[serde(default, alias = "EIN", alias = "SB_EIN", alias = "SPONS_DFE_EIN", deserialize_with = "cell")]
    pub ein: Option<String>,
    #[serde(
        default,
        alias = "PLAN_NUMBER",
        alias = "PLAN_NUM",
        alias = "SB_PN",
        alias = "SB_PLAN_NUM",
        alias = "PLAN_NO",
        deserialize_with = "cell"
    )]
    pub plan_num: Option<String>,
    #[serde(default, alias = "PLAN_YEAR", alias = "SB_PLAN_YR", alias = "PLAN_YR", deserialize_with = "cell")]
    pub plan_year: Option<String>,
    #[serde(
        default,
        alias = "SB_PLAN_YEAR_BEGIN_DATE",
        alias = "PLAN_YEAR_BEGIN_DATE",
        deserialize_with = "cell"
    )]
    pub plan_year_begin: Option<String>,

    #[serde(default, alias = "ACTIVE_COUNT", alias = "SB_ACT_PARTCP_CNT", deserialize_with = "cell")]
    pub active_count: Option<String>,
    #[serde(default, alias = "RETIREE_COUNT", alias = "SB_RTD_PARTCP_CNT", deserialize_with = "cell")]
    pub retired_count: Option<String>,
    #[serde(default, alias = "SEPARATED_COUNT", alias = "SB_TERM_PARTCP_CNT", deserialize_with = "cell")]
    pub terminated_count: Option<String>,
    #[serde(default, alias = "TOTAL_PARTICIPANTS", alias = "SB_TOT_PARTCP_CNT", deserialize_with = "cell")]
    pub total_participants: Option<String>,

    #[serde(default, alias = "ACT_LIABILITY", alias = "SB_ACT_VSTD_FNDNG_TGT_AMT", deserialize_with = "cell")]
    pub liability_active: Option<String>,
    #[serde(default, alias = "RET_LIABILITY", alias = "SB_RTD_FNDNG_TGT_AMT", deserialize_with = "cell")]
    pub liability_retired: Option<String>,
    #[serde(default, alias = "TERM_LIABILITY", alias = "SB_TERM_FNDNG_TGT_AMT", deserialize_with = "cell")]
    pub liability_terminated: Option<String>,
    #[serde(default, alias = "TOTAL_LIABILITY", alias = "SB_TOT_FNDNG_TGT_AMT", deserialize_with = "cell")]
    pub liability_total: Option<String>,

    #[serde(default, alias = "SB_EFF_INT_RATE_PRCNT", deserialize_with = "cell")]
    pub effective_interest_rate: Option<String>,
    #[serde(default, alias = "SB_1ST_SEGM_RATE_PRCNT", deserialize_with = "cell")]
    pub segment_rate_1: Option<String>,
    #[serde(default, alias = "SB_2ND_SEGM_RATE_PRCNT", deserialize_with = "cell")]
    pub segment_rate_2: Option<String>,
    #[serde(default, alias = "SB_3RD_SEGM_RATE_PRCNT", deserialize_with = "cell")]
    pub segment_rate_3: Option<String>,
    #[serde(default, alias = "SEGMENT_RATE_TYPE", deserialize_with = "cell")]
    pub segment_rate_type: Option<String>,
    #[serde(default, alias = "MORTALITY_CODE", alias = "SB_MORTALITY_TBL_CD", deserialize_with = "cell")]
    pub mortality_code: Option<String>,

    #[serde(default, alias = "ACTUARY_NAME", alias = "SB_ACTUARY_NAME_LINE", deserialize_with = "cell")]
    pub actuary_name: Option<String>,
    #[serde(default, alias = "ACTUARY_FIRM_NAME", alias = "SB_ACTUARY_FIRM_NAME", deserialize_with = "cell")]
    pub actuary_firm: Option<String>,
    #[serde(default, alias = "ACTUARY_CITY", alias = "SB_ACTUARY_US_CITY", deserialize_with = "cell")]
    pub actuary_city: Option<String>,
    #[serde(default, alias = "ACTUARY_STATE", alias = "SB_ACTUARY_US_STATE", deserialize_with = "cell")]
    pub actuary_state: Option<String>,
}

/// One parent-filing row as handed over by the loading collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFilingRow {
    #[serde(default, alias = "ACK_ID", deserialize_with = "cell")]
    pub ack_id: Option<String>,
    #[serde(default, alias = "EIN", alias = "SPONS_DFE_EIN", deserialize_with = "cell")]
    pub ein: Option<String>,
    #[serde(
        default,
        alias = "PLAN_NUMBER",
        alias = "PLAN_NUM",
        alias = "SPONS_DFE_PN",
        alias = "PN",
        deserialize_with = "cell"
    )]
    pub plan_num: Option<String>,
    #[serde(default, alias = "PLAN_YEAR", deserialize_with = "cell")]
    pub plan_year: Option<String>,
    #[serde(
        default,
        alias = "FORM_PLAN_YEAR_BEGIN_DATE",
        alias = "PLAN_YEAR_BEGIN_DATE",
        deserialize_with = "cell"
    )]
    pub plan_year_begin: Option<String>,
    #[serde(default, alias = "PLAN_NAME", deserialize_with = "cell")]
    pub plan_name: Option<String>,
    #[serde(default, alias = "SPONSOR_DFE_NAME", alias = "SPONSOR_NAME", deserialize_with = "cell")]
    pub sponsor_name: Option<String>,
    #[serde(default, alias = "BUSINESS_CODE", alias = "SPONS_DFE_BUSINESS_CODE", deserialize_with = "cell")]
    pub business_code: Option<String>,
}

/// Accept any JSON scalar as a cell and keep it as text.
/// The loader may hand over numbers where the source had numbers.
fn cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    use serde_json::Value;
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

// ── Categorical codes ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MortalityCode {
    PrescribedCombined,
    PrescribedSeparate,
    Substitute,
    NotReported,
    Unknown,
}

impl MortalityCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrescribedCombined => "prescribed_combined",
            Self::PrescribedSeparate => "prescribed_separate",
            Self::Substitute => "substitute",
            Self::NotReported => "not_reported",
            Self::Unknown => "unknown",
        }
    }
}

const MORTALITY_CODES: &[(&str, MortalityCode)] = &[
    ("1", MortalityCode::PrescribedCombined),
    ("PRESCRIBED COMBINED", MortalityCode::PrescribedCombined),
    ("2", MortalityCode::PrescribedSeparate),
    ("PRESCRIBED SEPARATE", MortalityCode::PrescribedSeparate),
    ("3", MortalityCode::Substitute),
    ("SUBSTITUTE", MortalityCode::Substitute),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentRateType {
    SegmentRates,
    FullYieldCurve,
    NotReported,
    Unknown,
}

impl SegmentRateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SegmentRates => "segment_rates",
            Self::FullYieldCurve => "full_yield_curve",
            Self::NotReported => "not_reported",
            Self::Unknown => "unknown",
        }
    }
}

const SEGMENT_RATE_TYPES: &[(&str, SegmentRateType)] = &[
    ("1", SegmentRateType::SegmentRates),
    ("SEGMENT", SegmentRateType::SegmentRates),
    ("SEGMENT RATES", SegmentRateType::SegmentRates),
    ("2", SegmentRateType::FullYieldCurve),
    ("FULL YIELD CURVE", SegmentRateType::FullYieldCurve),
    ("YIELD CURVE", SegmentRateType::FullYieldCurve),
    ("FYC", SegmentRateType::FullYieldCurve),
];

/// Look a code up in a fixed table. Blank → `not_reported`,
/// anything outside the table → `unknown`. The bool reports the latter.
fn lookup_code<T: Copy>(
    raw: Option<&str>,
    table: &[(&str, T)],
    not_reported: T,
    unknown: T,
) -> (T, bool) {
    let Some(text) = clean_text(raw) else {
        return (not_reported, false);
    };
    let key = text.to_ascii_uppercase();
    let key = key.strip_suffix(".0").unwrap_or(&key);
    match table.iter().find(|(code, _)| *code == key) {
        Some((_, value)) => (*value, false),
        None => (unknown, true),
    }
}

// ── Normalized records ────────────────────────────────────────────

/// One normalized actuarial-schedule filing. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// Position in the raw batch; kept for audit and stable ordering.
    pub row_index: usize,
    pub ack_id: AckId,
    pub ein: Option<Ein>,
    pub plan_num: Option<String>,
    pub plan_year: Field<i32>,
    /// Start of the plan year the filing reports on.
    pub reporting_period: Option<NaiveDate>,
    /// Filing date encoded in the ack_id prefix.
    pub filing_date: Option<NaiveDate>,

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
    /// Canonical firm name.
    pub actuary_firm: Option<String>,
    pub actuary_city: Option<String>,
    pub actuary_state: Option<String>,
}

impl ScheduleRecord {
    /// Liability fields that carry a value.
    pub fn has_any_liability(&self) -> bool {
        [
            &self.liability_active,
            &self.liability_retired,
            &self.liability_terminated,
            &self.liability_total,
        ]
        .iter()
        .any(|f| f.is_present())
    }

    /// `(field name, raw text)` for every numeric cell that was rejected.
    pub fn rejected_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |name: &'static str, raw: Option<&str>| {
            if let Some(raw) = raw {
                out.push((name, raw.to_string()));
            }
        };
        push("plan_year", self.plan_year.rejected_raw());
        push("active_count", self.active_count.rejected_raw());
        push("retired_count", self.retired_count.rejected_raw());
        push("terminated_count", self.terminated_count.rejected_raw());
        push("total_participants", self.total_participants.rejected_raw());
        push("liability_active", self.liability_active.rejected_raw());
        push("liability_retired", self.liability_retired.rejected_raw());
        push("liability_terminated", self.liability_terminated.rejected_raw());
        push("liability_total", self.liability_total.rejected_raw());
        push("effective_interest_rate", self.effective_interest_rate.rejected_raw());
        push("segment_rate_1", self.segment_rates[0].rejected_raw());
        push("segment_rate_2", self.segment_rates[1].rejected_raw());
        push("segment_rate_3", self.segment_rates[2].rejected_raw());
        out
    }
}

/// One normalized parent filing. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    pub row_index: usize,
    /// `None` when the row had no ack_id: rejected for the primary
    /// lookup, still a fallback candidate on `(ein, plan_num)`.
    pub ack_id: Option<AckId>,
    pub ein: Option<Ein>,
    pub plan_num: Option<String>,
    pub plan_year: Field<i32>,
    pub reporting_period: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    pub plan_name: Option<String>,
    pub sponsor_name: Option<String>,
    pub business_code: Option<String>,
    pub industry_sector: Option<String>,
}

// ── Per-row rejection ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Schedule,
    Filing,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Filing => "filing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    pub batch: BatchKind,
    pub row_index: usize,
    pub error: NormalizationError,
}

// ── Coercion rules ────────────────────────────────────────────────

const BLANK_MARKERS: &[&str] = &["", "NA", "N/A", "NONE", "NULL", "NAN", "-"];

/// Trimmed, whitespace-collapsed text; `None` for blanks and
/// "not reported" markers.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let collapsed = raw?.split_whitespace().collect::<Vec<_>>().join(" ");
    if BLANK_MARKERS.contains(&collapsed.to_ascii_uppercase().as_str()) {
        None
    } else {
        Some(collapsed)
    }
}

/// Alphanumeric core of an identifier. A numeric cell that arrived as
/// a float ("1.0") keeps its integer part only.
fn identifier_core(raw: Option<&str>) -> Option<String> {
    let text = clean_text(raw)?;
    let text = match text.split_once('.') {
        Some((int, frac))
            if !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b == b'0') =>
        {
            int.to_string()
        }
        _ => text,
    };
    let core: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (!core.is_empty()).then_some(core)
}

/// Filing acknowledgment id: alphanumeric, upper-cased.
pub fn normalize_ack_id(raw: Option<&str>) -> Option<AckId> {
    identifier_core(raw)
}

/// EIN: alphanumeric; purely numeric EINs are zero-padded to 9 digits.
pub fn normalize_ein(raw: Option<&str>) -> Option<Ein> {
    let core = identifier_core(raw)?;
    if core.bytes().all(|b| b.is_ascii_digit()) && core.len() < 9 {
        Some(format!("{core:0>9}"))
    } else {
        Some(core)
    }
}

/// Plan number: alphanumeric; numeric plan numbers are rendered as
/// three digits ("1", "01", "0001" all become "001").
pub fn normalize_plan_num(raw: Option<&str>) -> Option<String> {
    let core = identifier_core(raw)?;
    if core.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = core.trim_start_matches('0');
        Some(format!("{trimmed:0>3}"))
    } else {
        Some(core)
    }
}

/// Decimal cell. Tolerates thousands separators, a currency sign,
/// a trailing percent sign and accounting-style `(1,234)` negatives.
pub fn parse_decimal(raw: Option<&str>) -> Field<f64> {
    let Some(text) = clean_text(raw) else {
        return Field::Absent;
    };
    let (negative, body) = match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner.to_string()),
        None => (false, text.clone()),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%' | ' '))
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Field::Present(if negative { -v } else { v }),
        _ => Field::Rejected(text),
    }
}

/// Largest count the published tables can hold (SQLite INTEGER).
pub const MAX_COUNT: u64 = i64::MAX as u64;

/// Non-negative integer cell. "1,200" and "1200.0" are accepted;
/// negatives, fractions and counts above `MAX_COUNT` are rejected.
/// Parsed as an integer, never through a float.
pub fn parse_count(raw: Option<&str>) -> Field<u64> {
    let Some(text) = clean_text(raw) else {
        return Field::Absent;
    };
    let digits: String = text.chars().filter(|c| !matches!(c, ',' | ' ')).collect();
    let int_part = match digits.split_once('.') {
        Some((int, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => int,
        Some(_) => return Field::Rejected(text),
        None => digits.as_str(),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Field::Rejected(text);
    }
    match int_part.parse::<u64>() {
        Ok(v) if v <= MAX_COUNT => Field::Present(v),
        _ => Field::Rejected(text),
    }
}

/// Four-digit plan year.
pub fn parse_plan_year(raw: Option<&str>) -> Field<i32> {
    match parse_decimal(raw) {
        Field::Present(v) if v.fract() == 0.0 && (1900.0..=2999.0).contains(&v) => {
            Field::Present(v as i32)
        }
        Field::Present(_) => Field::Rejected(clean_text(raw).unwrap_or_default()),
        Field::Absent => Field::Absent,
        Field::Rejected(text) => Field::Rejected(text),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%Y/%m/%d"];

pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let text = clean_text(raw)?;
    // Datetime cells: keep the date part.
    let date_part = text.split(['T', ' ']).next().unwrap_or(&text);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Filing date encoded as `YYYYMMDD` in the first 8 characters of an ack_id.
pub fn ack_filing_date(ack_id: &str) -> Option<NaiveDate> {
    let prefix = ack_id.get(..8)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

/// Plan-year begin date when given, else January 1 of the plan year.
fn reporting_period(begin: Option<&str>, plan_year: &Field<i32>) -> Option<NaiveDate> {
    parse_date(begin).or_else(|| {
        plan_year
            .value()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
    })
}

// ── Per-row transforms ────────────────────────────────────────────

/// Normalize one schedule row. Categorical codes outside their lookup
/// tables come back in `CodeWarnings` so the stage can log them.
pub fn normalize_schedule_row(
    row_index: usize,
    raw: &RawScheduleRow,
) -> Result<(ScheduleRecord, CodeWarnings), NormalizationError> {
    let ack_id =
        normalize_ack_id(raw.ack_id.as_deref()).ok_or(NormalizationError::MissingPrimaryKey)?;

    let plan_year = parse_plan_year(raw.plan_year.as_deref());
    let (mortality_code, unknown_mortality) = lookup_code(
        raw.mortality_code.as_deref(),
        MORTALITY_CODES,
        MortalityCode::NotReported,
        MortalityCode::Unknown,
    );
    let (segment_rate_type, unknown_segment) = lookup_code(
        raw.segment_rate_type.as_deref(),
        SEGMENT_RATE_TYPES,
        SegmentRateType::NotReported,
        SegmentRateType::Unknown,
    );

    let record = ScheduleRecord {
        row_index,
        filing_date: ack_filing_date(&ack_id),
        reporting_period: reporting_period(raw.plan_year_begin.as_deref(), &plan_year),
        ack_id,
        ein: normalize_ein(raw.ein.as_deref()),
        plan_num: normalize_plan_num(raw.plan_num.as_deref()),
        plan_year,
        active_count: parse_count(raw.active_count.as_deref()),
        retired_count: parse_count(raw.retired_count.as_deref()),
        terminated_count: parse_count(raw.terminated_count.as_deref()),
        total_participants: parse_count(raw.total_participants.as_deref()),
        liability_active: parse_decimal(raw.liability_active.as_deref()),
        liability_retired: parse_decimal(raw.liability_retired.as_deref()),
        liability_terminated: parse_decimal(raw.liability_terminated.as_deref()),
        liability_total: parse_decimal(raw.liability_total.as_deref()),
        effective_interest_rate: parse_decimal(raw.effective_interest_rate.as_deref()),
        segment_rates: [
            parse_decimal(raw.segment_rate_1.as_deref()),
            parse_decimal(raw.segment_rate_2.as_deref()),
            parse_decimal(raw.segment_rate_3.as_deref()),
        ],
        segment_rate_type,
        mortality_code,
        actuary_name: clean_text(raw.actuary_name.as_deref()),
        actuary_firm: raw.actuary_firm.as_deref().and_then(canonical_firm_name),
        actuary_city: clean_text(raw.actuary_city.as_deref()),
        actuary_state: clean_text(raw.actuary_state.as_deref()),
    };

    let warnings = CodeWarnings {
        mortality_code: unknown_mortality.then(|| clean_text(raw.mortality_code.as_deref())).flatten(),
        segment_rate_type: unknown_segment
            .then(|| clean_text(raw.segment_rate_type.as_deref()))
            .flatten(),
    };
    Ok((record, warnings))
}

/// Raw text of categorical codes that fell outside their lookup table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeWarnings {
    pub mortality_code: Option<String>,
    pub segment_rate_type: Option<String>,
}

/// Normalize one parent-filing row.
pub fn normalize_filing_row(row_index: usize, raw: &RawFilingRow) -> FilingRecord {
    let ack_id = normalize_ack_id(raw.ack_id.as_deref());
    let plan_year = parse_plan_year(raw.plan_year.as_deref());
    let business_code = identifier_core(raw.business_code.as_deref());
    let industry_sector = business_code
        .as_deref()
        .and_then(naics_sector)
        .map(str::to_string);

    FilingRecord {
        row_index,
        filing_date: ack_id.as_deref().and_then(ack_filing_date),
        reporting_period: reporting_period(raw.plan_year_begin.as_deref(), &plan_year),
        ack_id,
        ein: normalize_ein(raw.ein.as_deref()),
        plan_num: normalize_plan_num(raw.plan_num.as_deref()),
        plan_year,
        plan_name: clean_text(raw.plan_name.as_deref()),
        sponsor_name: clean_text(raw.sponsor_name.as_deref()),
        business_code,
        industry_sector,
    }
}

// ── Stage ─────────────────────────────────────────────────────────

/// Both batches after normalization, in input order.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatches {
    pub schedules: Vec<ScheduleRecord>,
    pub filings: Vec<FilingRecord>,
    pub rejections: Vec<RowRejection>,
}

impl NormalizedBatches {
    pub fn rejected_count(&self, batch: BatchKind) -> usize {
        self.rejections.iter().filter(|r| r.batch == batch).count()
    }

    /// Filings usable for the primary lookup.
    pub fn keyed_filing_count(&self) -> usize {
        self.filings.iter().filter(|f| f.ack_id.is_some()).count()
    }
}

pub struct NormalizerSubsystem;

impl NormalizerSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn reject(
        batch: BatchKind,
        row_index: usize,
        error: NormalizationError,
        out: &mut NormalizedBatches,
        events: &mut Vec<PipelineEvent>,
    ) {
        log::warn!("{} row {row_index} rejected: {error}", batch.as_str());
        events.push(PipelineEvent::RowRejected {
            batch: batch.as_str().to_string(),
            row_index,
            reason: error.code().to_string(),
        });
        out.rejections.push(RowRejection { batch, row_index, error });
    }
}

impl Default for NormalizerSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStage for NormalizerSubsystem {
    type Input<'a> = (&'a [RawScheduleRow], &'a [RawFilingRow]);
    type Output = NormalizedBatches;

    fn name(&self) -> &'static str {
        "normalizer"
    }

    fn run(
        &self,
        (schedule_rows, filing_rows): Self::Input<'_>,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<NormalizedBatches> {
        let mut out = NormalizedBatches::default();

        for (idx, raw) in schedule_rows.iter().enumerate() {
            match normalize_schedule_row(idx, raw) {
                Ok((record, warnings)) => {
                    for (field, code) in [
                        ("mortality_code", warnings.mortality_code),
                        ("segment_rate_type", warnings.segment_rate_type),
                    ] {
                        if let Some(raw_code) = code {
                            log::warn!("{}: unknown {field} '{raw_code}'", record.ack_id);
                            events.push(PipelineEvent::UnknownCategoricalCode {
                                ack_id: record.ack_id.clone(),
                                field: field.to_string(),
                                raw: raw_code,
                            });
                        }
                    }
                    out.schedules.push(record);
                }
                Err(e) => Self::reject(BatchKind::Schedule, idx, e, &mut out, events),
            }
        }

        for (idx, raw) in filing_rows.iter().enumerate() {
            let record = normalize_filing_row(idx, raw);
            if record.ack_id.is_none() {
                let e = NormalizationError::MissingPrimaryKey;
                Self::reject(BatchKind::Filing, idx, e, &mut out, events);
            }
            out.filings.push(record);
        }

        log::debug!(
            "normalizer: {} schedules, {} filings, {} rejected",
            out.schedules.len(),
            out.filings.len(),
            out.rejections.len()
        );
        Ok(out)
    }
}
