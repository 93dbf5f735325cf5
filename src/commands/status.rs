use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::AppConfig;
use crate::error::RatingError;
use crate::export::discover_latest_artifacts;
use crate::store::{RaterSummary, RatingStore};
use crate::util::{now_utc_string, sha256_file};

#[derive(Debug, Serialize)]
struct StatusReport {
    generated_at: String,
    db_path: PathBuf,
    db_exists: bool,
    manifest_path: PathBuf,
    manifest_sha256: Option<String>,
    export_dir: PathBuf,
    latest_exports: usize,
    ratings: i64,
    needs_review: i64,
    raters: Vec<RaterSummary>,
}

pub fn run(config: &AppConfig, args: StatusArgs) -> Result<()> {
    let db_path = config.paths.db_path();
    let manifest_path = config.paths.manifest_path();
    let export_dir = config.paths.export_dir();

    info!(data_root = %config.paths.data_root.display(), "status requested");

    let manifest_sha256 = if manifest_path.exists() {
        Some(sha256_file(&manifest_path)?)
    } else {
        warn!(path = %manifest_path.display(), "manifest missing");
        None
    };

    let (ratings, needs_review, raters) = if db_path.exists() {
        match RatingStore::open_read_only(&db_path, config.scores) {
            Ok(store) => (
                store.count_ratings()?,
                store.count_needs_review()?,
                store.list_raters()?,
            ),
            Err(err @ RatingError::Validation(_)) => {
                warn!(path = %db_path.display(), error = %err, "database is not a rating store");
                (0, 0, Vec::new())
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", db_path.display()));
            }
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
        (0, 0, Vec::new())
    };

    let latest_exports = if export_dir.is_dir() {
        discover_latest_artifacts(&export_dir)?.len()
    } else {
        0
    };

    let report = StatusReport {
        generated_at: now_utc_string(),
        db_exists: db_path.exists(),
        db_path,
        manifest_path,
        manifest_sha256,
        export_dir,
        latest_exports,
        ratings,
        needs_review,
        raters,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    info!(
        path = %report.db_path.display(),
        ratings = report.ratings,
        needs_review = report.needs_review,
        raters = report.raters.len(),
        "database status"
    );
    info!(
        export_dir = %report.export_dir.display(),
        latest_exports = report.latest_exports,
        "export status"
    );
    for rater in &report.raters {
        println!(
            "{}\t{}\t{}\t{}",
            rater.rater_id,
            rater.ratings,
            rater.needs_review,
            rater
                .last_updated
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}
