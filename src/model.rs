use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DIMENSION_NAMES, ScoreBounds};

pub const EXPORT_ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub text: String,
    pub image_reference: String,
}

/// One row of the curated manifest (`selected_pairs.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub image: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub stratified_rank: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub image_quality: i64,
    pub text_quality: i64,
    pub consistency: i64,
}

impl Scores {
    pub const UNRATED: Self = Self {
        image_quality: 0,
        text_quality: 0,
        consistency: 0,
    };

    pub fn new(image_quality: i64, text_quality: i64, consistency: i64) -> Self {
        Self {
            image_quality,
            text_quality,
            consistency,
        }
    }

    pub fn total(self) -> i64 {
        self.image_quality + self.text_quality + self.consistency
    }

    pub fn named(self) -> [(&'static str, i64); 3] {
        [
            (DIMENSION_NAMES[0], self.image_quality),
            (DIMENSION_NAMES[1], self.text_quality),
            (DIMENSION_NAMES[2], self.consistency),
        ]
    }

    pub fn map(self, mut f: impl FnMut(i64) -> i64) -> Self {
        Self::new(f(self.image_quality), f(self.text_quality), f(self.consistency))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub sample_id: String,
    pub rater_id: String,
    #[serde(flatten)]
    pub scores: Scores,
    pub timestamp: DateTime<Utc>,
    pub needs_review: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSystem {
    pub max_per_dimension: i64,
    pub dimensions: Vec<String>,
    pub max_total: i64,
}

impl RatingSystem {
    pub fn from_bounds(bounds: ScoreBounds) -> Self {
        Self {
            max_per_dimension: bounds.max,
            dimensions: DIMENSION_NAMES.iter().map(|name| name.to_string()).collect(),
            max_total: bounds.max_total(),
        }
    }
}

impl Default for RatingSystem {
    fn default() -> Self {
        Self::from_bounds(ScoreBounds::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(alias = "image_id")]
    pub sample_id: String,
    #[serde(alias = "image_path", default)]
    pub image_reference: String,
    #[serde(default)]
    pub text: String,
    pub image_quality: i64,
    pub text_quality: i64,
    pub consistency: i64,
    pub total_score: i64,
    pub rank: usize,
}

/// Point-in-time export of one rater's scores over the whole catalog.
/// Exports written before versioning carry `artifact_version == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    #[serde(default)]
    pub artifact_version: u32,
    pub rater_id: String,
    #[serde(alias = "evaluation_date")]
    pub generated_at: String,
    #[serde(default)]
    pub catalog_fingerprint: Option<String>,
    pub total_samples: usize,
    #[serde(default)]
    pub rated_samples: usize,
    #[serde(default)]
    pub rating_system: RatingSystem,
    pub results: Vec<ExportRecord>,
}

/// Externally assigned rank per sample id.
pub type ReferenceRanking = BTreeMap<String, i64>;
