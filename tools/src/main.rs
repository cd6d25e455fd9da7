//! recon-runner: headless batch runner for the reconciliation pipeline.
//!
//! Usage:
//!   recon-runner --schedule sb.json --filings f5500.json --db recon.db
//!   recon-runner --schedule sb.json --filings f5500.json --export-dir out/
//!
//! Both batches are JSON arrays of row objects keyed by column name.

use anyhow::{Context, Result};
use pension_recon_core::{
    config::PipelineConfig,
    engine::{PipelineEngine, PipelineOutput},
    error::PipelineError,
    normalizer_subsystem::{RawFilingRow, RawScheduleRow},
    rollup_subsystem::SponsorRollupRecord,
    store::ReconStore,
};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::Path;

#[derive(serde::Serialize)]
struct ExportManifest<'a> {
    run_id: &'a str,
    master_rows: usize,
    sponsor_rows: usize,
    files: [&'static str; 3],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let schedule_path = find_arg(&args, "--schedule")
        .context("--schedule <path> is required")?;
    let filings_path = find_arg(&args, "--filings")
        .context("--filings <path> is required")?;
    let db = find_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = find_arg(&args, "--data-dir").unwrap_or("./data");
    let export_dir = find_arg(&args, "--export-dir");
    let top = parse_arg(&args, "--top", 10usize);
    let run_id = find_arg(&args, "--run-id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("run-{}", uuid::Uuid::new_v4()));

    println!("Pension Filing Reconciliation - recon-runner");
    println!("  run_id:    {run_id}");
    println!("  schedule:  {schedule_path}");
    println!("  filings:   {filings_path}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!();

    let config = PipelineConfig::load(data_dir)?;
    let schedule_rows: Vec<RawScheduleRow> = load_batch(schedule_path)?;
    let filing_rows: Vec<RawFilingRow> = load_batch(filings_path)?;

    let store = ReconStore::open(db)?;
    store.migrate()?;

    let engine = PipelineEngine::new(run_id.clone(), config, store);
    let output = match engine.run(&schedule_rows, &filing_rows) {
        Ok(output) => output,
        Err(PipelineError::Abort(reason)) => {
            println!("=== RUN ABORTED ===");
            println!("  {reason}");
            println!("  No tables were published.");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", output.summary);
    if output.summary.total_rejected() > 0 {
        log::warn!(
            "{} input rows were rejected; see the event log of run {run_id}",
            output.summary.total_rejected()
        );
    }
    println!();
    print_top_sponsors(&output.rollup, top);

    let stored_runs = engine.store().run_ids()?.len();
    match engine.store().path() {
        Some(path) if path != ":memory:" => {
            println!();
            println!("Published to {path} ({stored_runs} runs stored)");
        }
        _ => {
            println!();
            println!("Published to an in-memory database (discarded on exit)");
        }
    }

    if let Some(dir) = export_dir {
        export(&output, Path::new(dir))?;
        println!();
        println!("Exported tables to {dir}");
    }
    Ok(())
}

fn load_batch<T: DeserializeOwned>(path: &str) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let rows: Vec<T> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
    log::info!("loaded {} rows from {path}", rows.len());
    Ok(rows)
}

fn export(output: &PipelineOutput, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("master_plan.json"), output.master_table_json()?)?;
    fs::write(dir.join("sponsor_rollup.json"), output.rollup_table_json()?)?;
    let manifest = ExportManifest {
        run_id: &output.run_id,
        master_rows: output.master.len(),
        sponsor_rows: output.rollup.len(),
        files: ["master_plan.json", "sponsor_rollup.json", "summary.json"],
    };
    fs::write(dir.join("summary.json"), serde_json::to_string_pretty(&output.summary)?)?;
    fs::write(dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)?;
    Ok(())
}

fn print_top_sponsors(rollup: &[SponsorRollupRecord], top: usize) {
    println!("=== TOP SPONSORS BY LIABILITY ===");
    if rollup.is_empty() {
        println!("  (no attributable sponsors)");
        return;
    }
    for s in rollup.iter().take(top) {
        let liability = s
            .liability_total
            .value()
            .map_or("undefined".to_string(), |v| format!("${v:.0}"));
        let participants = s
            .total_participants
            .value()
            .map_or("undefined".to_string(), |v| v.to_string());
        println!(
            "  {} | {} | plans: {} ({} unverified) | liability: {} | participants: {}",
            s.ein,
            s.sponsor_name.as_deref().unwrap_or("(unnamed)"),
            s.plan_count,
            s.unverified_plan_count,
            liability,
            participants
        );
    }
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
