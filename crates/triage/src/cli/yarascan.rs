//! Yarascan command - Run YARA rules over an extracted case folder
//!
//! Writes the JSON result next to the case (or to `--output`) and prints a
//! summary. Per-file and per-rule problems end up in the result's `errors`
//! list; only setup failures make the command fail.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_duration, plural, print_table};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use triage_yarascan::{
    CancellationToken, ScanReport, ScanResult, ScanStats, YaraScanConfig, YaraScanner,
};

/// Arguments for the yarascan command
#[derive(Debug)]
pub struct YarascanArgs {
    pub case_dir: PathBuf,
    pub rules: Option<PathBuf>,
    pub workers: Option<usize>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub ignore: Vec<String>,
    pub follow_symlinks: bool,
    pub json: bool,
}

/// Execute the yarascan command
pub fn run(args: YarascanArgs) -> Result<()> {
    if !args.case_dir.exists() {
        return Err(HelpfulError::case_not_found(&args.case_dir).into());
    }
    if !args.case_dir.is_dir() {
        return Err(HelpfulError::not_a_directory(&args.case_dir).into());
    }

    let config = resolve_config(&args)?;
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.case_dir.join(&config.output_file_name));
    let ignore = ignore_names(&config, &output_path, &args.ignore);

    let token = CancellationToken::new();
    install_interrupt_handler(token.clone());

    let scanner = YaraScanner::from_config(&config).cancellation_token(token);
    let report = scanner
        .scan_with_stats(&args.case_dir, &config.rules_path, ignore)
        .map_err(HelpfulError::from)?;

    write_result(&output_path, &report.result)?;
    info!(output = %output_path.display(), "Wrote scan results");

    if args.json {
        println!("{}", report.result.to_json_pretty().map_err(HelpfulError::from)?);
    } else {
        print_summary(&report, &output_path);
    }

    Ok(())
}

/// Config file values, then command-line overrides
fn resolve_config(args: &YarascanArgs) -> Result<YaraScanConfig> {
    let mut config = match &args.config {
        Some(path) => YaraScanConfig::load(path)
            .map_err(|e| HelpfulError::invalid_config(path, &e.to_string()))?,
        None => YaraScanConfig::default(),
    };

    if let Some(rules) = &args.rules {
        config.rules_path = rules.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.follow_symlinks {
        config.follow_symlinks = true;
    }
    Ok(config)
}

/// Base names never scanned: the configured result name, the actual output
/// file name, and anything passed with `--ignore`.
fn ignore_names(config: &YaraScanConfig, output_path: &Path, extra: &[String]) -> Vec<String> {
    let mut names = vec![config.output_file_name.clone()];
    if let Some(name) = output_path.file_name().and_then(|n| n.to_str()) {
        names.push(name.to_string());
    }
    names.extend(extra.iter().cloned());
    names.sort();
    names.dedup();
    names
}

fn install_interrupt_handler(token: CancellationToken) {
    let result = ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            eprintln!("Interrupted, finishing files in progress...");
        }
        token.cancel();
    });
    if let Err(e) = result {
        warn!(error = %e, "Ctrl+C handler not installed; interrupting will kill the scan");
    }
}

fn write_result(path: &Path, result: &ScanResult) -> Result<()> {
    let json = result.to_json_pretty().map_err(HelpfulError::from)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| HelpfulError::cannot_write_output(path, &e.to_string()))?;
    }
    fs::write(path, json).map_err(|e| HelpfulError::cannot_write_output(path, &e.to_string()))?;
    Ok(())
}

/// One row per (file, rule) match
fn match_rows(result: &ScanResult) -> Vec<Vec<String>> {
    result
        .matches
        .iter()
        .flat_map(|(file, rules)| {
            rules.iter().map(move |(rule, record)| {
                vec![
                    file.clone(),
                    rule.clone(),
                    record.namespace.clone(),
                    record.tags.join(", "),
                ]
            })
        })
        .collect()
}

fn stats_line(stats: &ScanStats) -> String {
    let mut line = format!(
        "Scanned {} with {} in {}: {} matched",
        plural(stats.files_scanned, "file"),
        plural(stats.rule_sources_loaded, "rule file"),
        format_duration(Duration::from_millis(stats.duration_ms)),
        stats.files_matched,
    );
    if stats.files_failed > 0 {
        line.push_str(&format!(", {} failed", stats.files_failed));
    }
    if stats.files_abandoned > 0 {
        line.push_str(&format!(", {} skipped after interrupt", stats.files_abandoned));
    }
    line
}

fn print_summary(report: &ScanReport, output_path: &Path) {
    let rows = match_rows(&report.result);
    if rows.is_empty() {
        println!("No matches.");
    } else {
        print_table(&["File", "Rule", "Rule file", "Tags"], rows);
    }

    println!();
    println!("{}", stats_line(&report.stats));

    if !report.result.errors.is_empty() {
        println!();
        println!("Errors ({}):", report.result.errors.len());
        for error in &report.result.errors {
            println!("  {}", error);
        }
    }

    println!();
    println!("Results written to {}", output_path.display());
}
