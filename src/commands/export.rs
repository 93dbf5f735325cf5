use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::SampleCatalog;
use crate::cli::ExportArgs;
use crate::commands::open_store;
use crate::config::AppConfig;
use crate::error::RatingError;
use crate::export::{ArtifactNaming, Exporter, latest_artifact_path, write_artifact};

pub fn run(config: &AppConfig, args: ExportArgs) -> Result<()> {
    let catalog = SampleCatalog::new(&config.paths)
        .load()
        .context("failed to load sample catalog")?;
    if catalog.is_empty() {
        bail!("refusing to export against an empty catalog");
    }

    let store = open_store(config)?;
    let mut rater_ids: Vec<String> = if args.all_raters {
        store
            .list_raters()?
            .into_iter()
            .map(|summary| summary.rater_id)
            .collect()
    } else {
        args.rater_ids.clone()
    };
    rater_ids.sort();
    rater_ids.dedup();
    if rater_ids.is_empty() {
        bail!("no raters to export");
    }

    let export_dir = args
        .export_dir
        .clone()
        .unwrap_or_else(|| config.paths.export_dir());
    let mut claimed = HashMap::with_capacity(rater_ids.len());
    for rater_id in &rater_ids {
        let path = latest_artifact_path(&export_dir, rater_id)?;
        if let Some(previous) = claimed.insert(path.clone(), rater_id) {
            bail!(
                "raters {previous:?} and {rater_id:?} both resolve to {}",
                path.display()
            );
        }
    }

    let exporter = Exporter::new(config.scores);
    let taken_at = Utc::now();

    info!(
        raters = rater_ids.len(),
        samples = catalog.len(),
        export_dir = %export_dir.display(),
        "starting export"
    );

    for rater_id in &rater_ids {
        let ratings = store
            .list_by_rater(rater_id)
            .with_context(|| format!("failed to read ratings for {rater_id}"))?;

        let flagged = ratings.iter().filter(|rating| rating.needs_review).count();
        if flagged > 0 {
            warn!(rater_id = %rater_id, flagged, "exporting ratings that are flagged for review");
        }

        let artifact = match exporter.export(rater_id, &catalog, &ratings) {
            Ok(artifact) => artifact,
            Err(err @ RatingError::NoData { .. }) if args.all_raters => {
                warn!(rater_id = %rater_id, error = %err, "skipping rater");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to export ratings for {rater_id}"));
            }
        };

        let latest = write_artifact(&export_dir, &artifact, ArtifactNaming::Latest)?;
        println!("{}", latest.display());

        if args.snapshot {
            let snapshot = write_artifact(
                &export_dir,
                &artifact,
                ArtifactNaming::Snapshot { taken_at },
            )?;
            println!("{}", snapshot.display());
        }
    }

    Ok(())
}
