use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal plan-size bucket keyed on total participant count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbSizeCategory {
    /// Total participants absent or rejected.
    Unknown,
    Small,
    Mid,
    Large,
    Jumbo,
}

impl DbSizeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Small => "small",
            Self::Mid => "mid",
            Self::Large => "large",
            Self::Jumbo => "jumbo",
        }
    }
}

/// One row of the size threshold table: plans with at least
/// `min_participants` total participants fall into `category`,
/// up to the next band's threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeBand {
    pub category: DbSizeCategory,
    pub min_participants: u64,
}

/// Externally supplied pipeline tunables. Passed into every stage;
/// no stage keeps its own copy of these numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Size threshold table, ascending by `min_participants`.
    pub size_bands: Vec<SizeBand>,
    /// Allowed excess of active + retired + terminated over total.
    pub participant_count_tolerance: u64,
    /// Leave `merge_quality = None` records out of sponsor sums.
    #[serde(default = "default_true")]
    pub exclude_unverified_from_sums: bool,
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Load from the data/ directory.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/pipeline/pipeline_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            size_bands: vec![
                SizeBand { category: DbSizeCategory::Small, min_participants: 0 },
                SizeBand { category: DbSizeCategory::Mid,   min_participants: 1_000 },
                SizeBand { category: DbSizeCategory::Large, min_participants: 10_000 },
                SizeBand { category: DbSizeCategory::Jumbo, min_participants: 50_000 },
            ],
            participant_count_tolerance: 1,
            exclude_unverified_from_sums: true,
        }
    }

    /// Reject threshold tables that would leave counts unbucketed
    /// or make the bucket order ambiguous.
    pub fn validate(&self) -> anyhow::Result<()> {
        let first = self
            .size_bands
            .first()
            .ok_or_else(|| anyhow::anyhow!("size_bands must not be empty"))?;
        if first.min_participants != 0 {
            anyhow::bail!(
                "first size band must start at 0 participants (got {})",
                first.min_participants
            );
        }
        for pair in self.size_bands.windows(2) {
            if pair[1].min_participants <= pair[0].min_participants {
                anyhow::bail!(
                    "size band thresholds must be strictly ascending ({} after {})",
                    pair[1].min_participants,
                    pair[0].min_participants
                );
            }
        }
        if self
            .size_bands
            .iter()
            .any(|b| b.category == DbSizeCategory::Unknown)
        {
            anyhow::bail!("'unknown' is reserved for absent participant counts");
        }
        Ok(())
    }

    /// Bucket a total participant count through the threshold table.
    pub fn size_category(&self, total_participants: Option<u64>) -> DbSizeCategory {
        let Some(total) = total_participants else {
            return DbSizeCategory::Unknown;
        };
        self.size_bands
            .iter()
            .rev()
            .find(|band| total >= band.min_participants)
            .map_or(DbSizeCategory::Unknown, |band| band.category)
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Configuration:")?;
        for band in &self.size_bands {
            writeln!(
                f,
                "  {:<7} >= {} participants",
                band.category.as_str(),
                band.min_participants
            )?;
        }
        writeln!(
            f,
            "  Participant Count Tolerance: {}",
            self.participant_count_tolerance
        )?;
        writeln!(
            f,
            "  Exclude Unverified From Sums: {}",
            self.exclude_unverified_from_sums
        )
    }
}
