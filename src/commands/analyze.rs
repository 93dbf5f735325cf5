use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::analysis::{AnalysisReport, RaterCorrelation, analyze, build_report};
use crate::catalog::load_reference_ranking;
use crate::cli::AnalyzeArgs;
use crate::config::{AnalysisSettings, AppConfig};
use crate::export::{discover_latest_artifacts, latest_artifact_path, read_artifact};
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(config: &AppConfig, args: AnalyzeArgs) -> Result<()> {
    let settings = AnalysisSettings {
        top_n: args.top_n.unwrap_or(config.analysis.top_n),
        significance_level: args
            .significance_level
            .unwrap_or(config.analysis.significance_level),
    };
    if !(settings.significance_level > 0.0 && settings.significance_level < 1.0) {
        bail!(
            "significance level must be in (0, 1), got {}",
            settings.significance_level
        );
    }

    let export_dir = args
        .export_dir
        .clone()
        .unwrap_or_else(|| config.paths.export_dir());
    let reference_path = args
        .reference_path
        .clone()
        .unwrap_or_else(|| config.paths.manifest_path());

    let reference = load_reference_ranking(&reference_path)
        .with_context(|| format!("failed to load reference ranking {}", reference_path.display()))?;

    let artifact_paths: Vec<PathBuf> = if args.rater_ids.is_empty() {
        discover_latest_artifacts(&export_dir)?
    } else {
        args.rater_ids
            .iter()
            .map(|rater_id| latest_artifact_path(&export_dir, rater_id))
            .collect::<Result<_>>()?
    };
    if artifact_paths.is_empty() {
        bail!("no export artifacts found in {}", export_dir.display());
    }

    let mut exports = BTreeMap::new();
    let mut fingerprints = BTreeMap::new();
    for path in &artifact_paths {
        let artifact = read_artifact(path)
            .with_context(|| format!("failed to read export artifact {}", path.display()))?;
        if exports.contains_key(&artifact.rater_id) {
            bail!(
                "rater {} appears in more than one artifact ({})",
                artifact.rater_id,
                path.display()
            );
        }
        if let Some(fingerprint) = &artifact.catalog_fingerprint {
            fingerprints.insert(fingerprint.clone(), artifact.rater_id.clone());
        }
        exports.insert(artifact.rater_id.clone(), artifact);
    }
    if fingerprints.len() > 1 {
        warn!(
            catalogs = fingerprints.len(),
            "exports were built from different catalogs"
        );
    }

    info!(
        raters = exports.len(),
        reference_samples = reference.len(),
        "starting correlation analysis"
    );
    let results = analyze(&reference, &exports).context("correlation analysis failed")?;
    let report = build_report(&results, reference.len(), settings, now_utc_string());

    if let Some(report_path) = &args.report_path {
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote analysis report");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!("Spearman correlation with the reference ranking:");
    println!("{:<24} {:>10} {:>12} {:>6}", "rater", "rho", "p_value", "n");
    for entry in &report.rankings {
        print_row(entry);
    }

    println!();
    println!("Top {} raters by correlation:", report.top_n);
    for entry in &report.top_raters {
        print_row(entry);
    }

    println!();
    println!("Significant raters (p < {}):", report.significance_level);
    if report.significant_raters.is_empty() {
        println!("  none");
    }
    for entry in &report.significant_raters {
        print_row(entry);
    }
}

fn print_row(entry: &RaterCorrelation) {
    println!(
        "{:<24} {:>10} {:>12} {:>6}",
        entry.rater_id,
        format_optional(entry.correlation),
        format_optional(entry.p_value),
        entry.sample_count
    );
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.4}"))
        .unwrap_or_else(|| "n/a".to_string())
}
