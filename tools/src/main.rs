//! recon-runner: batch SPA ledger reconciliation.
//!
//! Usage:
//!   recon-runner --db spa.db --accounts u1,u2,u3
//!   recon-runner --db spa.db --accounts-file ids.txt --dry-run
//!   recon-runner --db spa.db --all --config recon.json --verbose

use anyhow::{bail, Result};
use spa_ledger_core::{batch::ReconBatch, config::ReconConfig, store::ReconStore};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let dry_run = args.iter().any(|a| a == "--dry-run");
    let all = args.iter().any(|a| a == "--all");
    let verbose = args.iter().any(|a| a == "--verbose");

    let config = match flag_value(&args, "--config") {
        Some(path) => ReconConfig::load(Path::new(path))?,
        None => ReconConfig::default(),
    };

    let store = ReconStore::open(db)?;
    store.migrate()?;

    let batch = ReconBatch::new(&store, &config, dry_run);
    let report = if all {
        batch.run_all()?
    } else {
        let ids = account_list(&args)?;
        batch.run(&ids)
    };

    println!("SPA ledger reconciliation{}", if dry_run { " (dry run)" } else { "" });
    println!("  db: {db}");
    println!();
    for result in &report.results {
        println!("{}", result.report_line());
        if verbose {
            for line in result.breakdown_lines() {
                println!("{line}");
            }
        }
    }
    println!();
    println!("=== RUN SUMMARY ===");
    println!("  accounts:     {}", report.results.len());
    println!("  consistent:   {}", report.consistent());
    println!("  corrected:    {}", report.corrected());
    println!("  flagged:      {}", report.flagged());
    println!("  failed:       {}", report.failed());
    println!("  SPA restored: {}", report.points_restored());

    if report.any_failed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Resolve the account id list from --accounts or --accounts-file.
fn account_list(args: &[String]) -> Result<Vec<String>> {
    if let Some(csv) = flag_value(args, "--accounts") {
        let ids: Vec<String> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            bail!("--accounts given but no ids parsed");
        }
        return Ok(ids);
    }
    if let Some(path) = flag_value(args, "--accounts-file") {
        let raw = std::fs::read_to_string(path)?;
        let ids: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            bail!("accounts file '{path}' contains no ids");
        }
        return Ok(ids);
    }
    bail!("no accounts selected: pass --accounts, --accounts-file or --all");
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
