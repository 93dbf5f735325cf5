use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::ScoreBounds;
use crate::error::{RatingError, RatingResult};
use crate::model::{
    EXPORT_ARTIFACT_VERSION, ExportArtifact, ExportRecord, Rating, RatingSystem, Scores,
};
use crate::store::validate_rater_id;
use crate::util::{canonical_sample_id, rfc3339_string, utc_compact_string, write_json_pretty};

const EXPORT_FILE_PREFIX: &str = "rating_results_";
const SNAPSHOT_DIR: &str = "snapshots";
const RATER_HASH_LEN: usize = 16;

/// How an artifact file is named on disk. `Latest` is overwritten by every
/// re-export; `Snapshot` keeps a timestamped history under `snapshots/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactNaming {
    Latest,
    Snapshot { taken_at: DateTime<Utc> },
}

pub struct Exporter {
    rating_system: RatingSystem,
}

impl Exporter {
    pub fn new(bounds: ScoreBounds) -> Self {
        Self {
            rating_system: RatingSystem::from_bounds(bounds),
        }
    }

    pub fn export(
        &self,
        rater_id: &str,
        catalog: &Catalog,
        ratings: &[Rating],
    ) -> RatingResult<ExportArtifact> {
        self.export_at(rater_id, catalog, ratings, Utc::now())
    }

    /// Joins `ratings` onto the catalog, ranks by total score and wraps the
    /// result. Unrated samples appear with zero scores. Equal totals keep
    /// catalog order, so the ranking depends only on store and catalog.
    pub fn export_at(
        &self,
        rater_id: &str,
        catalog: &Catalog,
        ratings: &[Rating],
        generated_at: DateTime<Utc>,
    ) -> RatingResult<ExportArtifact> {
        let rater_id = validate_rater_id(rater_id)?;
        if ratings.is_empty() {
            return Err(RatingError::NoData {
                rater_id: rater_id.to_string(),
            });
        }

        let mut by_sample = HashMap::with_capacity(ratings.len());
        for rating in ratings {
            by_sample.insert(canonical_sample_id(&rating.sample_id)?, rating.scores);
        }

        let mut rated_samples = 0_usize;
        let mut results: Vec<ExportRecord> = catalog
            .samples
            .iter()
            .map(|sample| {
                let scores = match by_sample.remove(&sample.id) {
                    Some(scores) => {
                        rated_samples += 1;
                        scores
                    }
                    None => Scores::UNRATED,
                };
                ExportRecord {
                    sample_id: sample.id.clone(),
                    image_reference: sample.image_reference.clone(),
                    text: sample.text.clone(),
                    image_quality: scores.image_quality,
                    text_quality: scores.text_quality,
                    consistency: scores.consistency,
                    total_score: scores.total(),
                    rank: 0,
                }
            })
            .collect();

        if rated_samples == 0 {
            warn!(
                rater_id,
                ratings = ratings.len(),
                "no stored rating matches a catalog sample"
            );
            return Err(RatingError::NoData {
                rater_id: rater_id.to_string(),
            });
        }

        if !by_sample.is_empty() {
            let mut orphaned: Vec<&String> = by_sample.keys().collect();
            orphaned.sort();
            warn!(
                rater_id,
                orphaned = orphaned.len(),
                first = %orphaned[0],
                "ignoring ratings for samples outside the catalog"
            );
        }

        results.sort_by(|left, right| right.total_score.cmp(&left.total_score));
        for (position, record) in results.iter_mut().enumerate() {
            record.rank = position + 1;
        }

        Ok(ExportArtifact {
            artifact_version: EXPORT_ARTIFACT_VERSION,
            rater_id: rater_id.to_string(),
            generated_at: rfc3339_string(generated_at),
            catalog_fingerprint: Some(catalog.fingerprint()),
            total_samples: results.len(),
            rated_samples,
            rating_system: self.rating_system.clone(),
            results,
        })
    }
}

/// File name for `rater_id`. Ids outside `[\p{L}\p{N}_-]` are sanitized and
/// suffixed with `.` plus a hash of the raw id; a clean id never contains `.`,
/// so two raters never share a file.
pub fn artifact_file_name(rater_id: &str, naming: ArtifactNaming) -> Result<String> {
    let unsafe_chars =
        Regex::new(r"[^\p{L}\p{N}_-]").context("failed to compile file name regex")?;
    let raw = rater_id.trim();
    let sanitized = unsafe_chars.replace_all(raw, "_");
    let safe_rater = if sanitized == raw {
        raw.to_string()
    } else {
        let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
        format!("{sanitized}.{}", &digest[..RATER_HASH_LEN])
    };

    Ok(match naming {
        ArtifactNaming::Latest => format!("{EXPORT_FILE_PREFIX}{safe_rater}.json"),
        ArtifactNaming::Snapshot { taken_at } => format!(
            "{EXPORT_FILE_PREFIX}{safe_rater}_{}.json",
            utc_compact_string(taken_at)
        ),
    })
}

pub fn artifact_path(export_dir: &Path, rater_id: &str, naming: ArtifactNaming) -> Result<PathBuf> {
    let file_name = artifact_file_name(rater_id, naming)?;
    Ok(match naming {
        ArtifactNaming::Latest => export_dir.join(file_name),
        ArtifactNaming::Snapshot { .. } => export_dir.join(SNAPSHOT_DIR).join(file_name),
    })
}

pub fn latest_artifact_path(export_dir: &Path, rater_id: &str) -> Result<PathBuf> {
    artifact_path(export_dir, rater_id, ArtifactNaming::Latest)
}

pub fn write_artifact(
    export_dir: &Path,
    artifact: &ExportArtifact,
    naming: ArtifactNaming,
) -> Result<PathBuf> {
    let path = artifact_path(export_dir, &artifact.rater_id, naming)?;
    write_json_pretty(&path, artifact)?;
    info!(
        path = %path.display(),
        rater_id = %artifact.rater_id,
        total_samples = artifact.total_samples,
        rated_samples = artifact.rated_samples,
        "wrote export artifact"
    );
    Ok(path)
}

pub fn read_artifact(path: &Path) -> RatingResult<ExportArtifact> {
    let raw = fs::read(path).map_err(|err| RatingError::io(path, err))?;
    serde_json::from_slice(&raw).map_err(|err| RatingError::json(path, err))
}

/// Lists the "latest" artifacts directly in `export_dir`, sorted by file
/// name. Snapshots live in a subdirectory and are never listed.
pub fn discover_latest_artifacts(export_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = fs::read_dir(export_dir)
        .with_context(|| format!("failed to read {}", export_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", export_dir.display()))?;
        let path = entry.path();
        let is_artifact = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(EXPORT_FILE_PREFIX))
            .and_then(|name| name.strip_suffix(".json"))
            .is_some_and(|stem| !stem.is_empty());

        if is_artifact && path.is_file() {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests;
