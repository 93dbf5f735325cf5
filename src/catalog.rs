use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::PathConfig;
use crate::error::{RatingError, RatingResult};
use crate::model::{ManifestEntry, ReferenceRanking, Sample};
use crate::util::{canonical_sample_id, has_image_extension};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogSource {
    Manifest {
        path: String,
    },
    DirectoryScan {
        path: String,
        fallback_reason: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub source: CatalogSource,
    pub samples: Vec<Sample>,
    pub warnings: Vec<String>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// SHA-256 over the ordered `(id, image_reference, text)` tuples, so two
    /// exports can be checked for having been built from the same catalog.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for sample in &self.samples {
            hasher.update(sample.id.as_bytes());
            hasher.update([0_u8]);
            hasher.update(sample.image_reference.as_bytes());
            hasher.update([0_u8]);
            hasher.update(sample.text.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Resolves the ordered set of ratable samples. A curated manifest wins over
/// scanning the images directory.
pub struct SampleCatalog {
    images_dir: PathBuf,
    texts_dir: PathBuf,
    manifest_path: PathBuf,
    image_url_prefix: String,
}

impl SampleCatalog {
    pub fn new(paths: &PathConfig) -> Self {
        Self {
            images_dir: paths.images_dir(),
            texts_dir: paths.texts_dir(),
            manifest_path: paths.manifest_path(),
            image_url_prefix: paths.image_url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn load(&self) -> RatingResult<Catalog> {
        if !self.manifest_path.is_file() {
            debug!(path = %self.manifest_path.display(), "no curated manifest, scanning images");
            return self.scan(None);
        }

        let entries = load_manifest_entries(&self.manifest_path)?;
        let mut warnings = Vec::new();
        let samples = self.samples_from_manifest(&entries, &mut warnings);

        if samples.is_empty() {
            let reason = format!(
                "manifest {} listed {} entries but none had an image asset",
                self.manifest_path.display(),
                entries.len()
            );
            warn!(reason = %reason, "falling back to directory scan");
            let mut catalog = self.scan(Some(reason))?;
            warnings.append(&mut catalog.warnings);
            catalog.warnings = warnings;
            return Ok(catalog);
        }

        info!(
            path = %self.manifest_path.display(),
            samples = samples.len(),
            dropped = entries.len() - samples.len(),
            "loaded catalog from manifest"
        );

        Ok(Catalog {
            source: CatalogSource::Manifest {
                path: self.manifest_path.display().to_string(),
            },
            samples,
            warnings,
        })
    }

    fn samples_from_manifest(
        &self,
        entries: &[ManifestEntry],
        warnings: &mut Vec<String>,
    ) -> Vec<Sample> {
        let mut seen = HashSet::new();
        let mut samples = Vec::with_capacity(entries.len());

        for entry in entries {
            let file_name = file_name_of(&entry.image);
            if !has_image_extension(Path::new(file_name)) {
                let message = format!(
                    "manifest entry {} is not a jpg/jpeg/png image, skipping",
                    entry.image
                );
                warn!(image = %entry.image, "{message}");
                warnings.push(message);
                continue;
            }
            let id = match canonical_sample_id(&entry.image) {
                Ok(id) => id,
                Err(err) => {
                    warn!(image = %entry.image, error = %err, "skipping manifest entry");
                    warnings.push(err.to_string());
                    continue;
                }
            };

            let asset_path = self.images_dir.join(file_name);
            if !asset_path.is_file() {
                let err = RatingError::MissingAsset {
                    image: entry.image.clone(),
                    expected_path: asset_path.display().to_string(),
                };
                warn!(error = %err, "skipping manifest entry");
                warnings.push(err.to_string());
                continue;
            }

            if !seen.insert(id.clone()) {
                let message = format!("duplicate sample id {id} in manifest, keeping first entry");
                warn!(image = %entry.image, "{message}");
                warnings.push(message);
                continue;
            }

            samples.push(Sample {
                id,
                text: entry.text.trim().to_string(),
                image_reference: self.image_reference(file_name),
            });
        }

        samples
    }

    fn scan(&self, fallback_reason: Option<String>) -> RatingResult<Catalog> {
        let mut warnings = Vec::new();
        let source = CatalogSource::DirectoryScan {
            path: self.images_dir.display().to_string(),
            fallback_reason,
        };

        if !self.images_dir.is_dir() {
            let message = format!("images directory {} does not exist", self.images_dir.display());
            warn!("{message}");
            warnings.push(message);
            return Ok(Catalog {
                source,
                samples: Vec::new(),
                warnings,
            });
        }

        let mut file_names = Vec::new();
        let entries =
            fs::read_dir(&self.images_dir).map_err(|err| RatingError::io(&self.images_dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| RatingError::io(&self.images_dir, err))?;
            let path = entry.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            match path.file_name().and_then(|name| name.to_str()) {
                Some(name) => file_names.push(name.to_string()),
                None => warn!(path = %path.display(), "skipping non UTF-8 image file name"),
            }
        }
        file_names.sort();

        let mut seen = HashSet::new();
        let mut samples = Vec::with_capacity(file_names.len());
        for file_name in file_names {
            let id = canonical_sample_id(&file_name)?;
            if !seen.insert(id.clone()) {
                let message = format!("duplicate sample id {id} from {file_name}, keeping first file");
                warn!("{message}");
                warnings.push(message);
                continue;
            }

            let text = self.read_text(&id, &mut warnings);
            samples.push(Sample {
                id,
                text,
                image_reference: self.image_reference(&file_name),
            });
        }

        info!(
            path = %self.images_dir.display(),
            samples = samples.len(),
            "loaded catalog from directory scan"
        );

        Ok(Catalog {
            source,
            samples,
            warnings,
        })
    }

    fn read_text(&self, id: &str, warnings: &mut Vec<String>) -> String {
        let path = self.texts_dir.join(format!("{id}.txt"));
        match fs::read_to_string(&path) {
            Ok(text) => text.trim().to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                let message = format!("failed to read text {}: {err}", path.display());
                warn!("{message}");
                warnings.push(message);
                String::new()
            }
        }
    }

    fn image_reference(&self, file_name: &str) -> String {
        format!("{}/{}", self.image_url_prefix, file_name)
    }
}

pub fn load_manifest_entries(path: &Path) -> RatingResult<Vec<ManifestEntry>> {
    let raw = fs::read(path).map_err(|err| RatingError::io(path, err))?;
    serde_json::from_slice(&raw).map_err(|err| RatingError::json(path, err))
}

/// Reads the manifest as `{sample id -> stratified_rank}`. Entries without a
/// rank carry no reference information and are skipped.
pub fn load_reference_ranking(path: &Path) -> RatingResult<ReferenceRanking> {
    let entries = load_manifest_entries(path)?;
    let mut ranking = ReferenceRanking::new();
    let mut unranked = 0_usize;

    for entry in &entries {
        let Some(rank) = entry.stratified_rank else {
            unranked += 1;
            continue;
        };
        let id = canonical_sample_id(&entry.image)?;
        if ranking.contains_key(&id) {
            warn!(sample_id = %id, "duplicate reference rank, keeping first entry");
            continue;
        }
        ranking.insert(id, rank);
    }

    info!(
        path = %path.display(),
        ranked = ranking.len(),
        unranked,
        "loaded reference ranking"
    );
    Ok(ranking)
}

fn file_name_of(reference: &str) -> &str {
    reference
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(reference)
}
