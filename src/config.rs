use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::GlobalArgs;

pub const DIMENSION_NAMES: [&str; 3] = ["image_quality", "text_quality", "consistency"];

/// Everything a component needs to know about its environment. Built once by
/// the binary and handed down; nothing below `main` reads process state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub paths: PathConfig,
    pub scores: ScoreBounds,
    pub legacy: LegacyScorePolicy,
    pub analysis: AnalysisSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    pub data_root: PathBuf,
    pub db_path: PathBuf,
    pub images_dir: PathBuf,
    pub texts_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub export_dir: PathBuf,
    pub image_url_prefix: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            db_path: PathBuf::from("ratings.db"),
            images_dir: PathBuf::from("static/images"),
            texts_dir: PathBuf::from("static/texts"),
            manifest_path: PathBuf::from("exports/selected_pairs.json"),
            export_dir: PathBuf::from("exports"),
            image_url_prefix: "/static/images".to_string(),
        }
    }
}

impl PathConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.db_path)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.resolve(&self.images_dir)
    }

    pub fn texts_dir(&self) -> PathBuf {
        self.resolve(&self.texts_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.manifest_path)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.resolve(&self.export_dir)
    }
}

/// Inclusive bound every submitted dimension must satisfy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreBounds {
    pub min: i64,
    pub max: i64,
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self { min: 1, max: 7 }
    }
}

impl ScoreBounds {
    pub fn contains(self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn max_total(self) -> i64 {
        self.max * DIMENSION_NAMES.len() as i64
    }
}

/// Repair rules for rows written before the current bound existed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LegacyScorePolicy {
    pub min: i64,
    pub max: i64,
    pub sentinel: i64,
    pub unscored: i64,
}

impl Default for LegacyScorePolicy {
    fn default() -> Self {
        Self {
            min: 1,
            max: 3,
            sentinel: 30,
            unscored: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisSettings {
    pub top_n: usize,
    pub significance_level: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_n: 3,
            significance_level: 0.05,
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then command-line overrides.
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let mut config = match &global.config {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };

        if let Some(data_root) = &global.data_root {
            config.paths.data_root = data_root.clone();
        }
        if let Some(db_path) = &global.db_path {
            config.paths.db_path = db_path.clone();
        }

        config.check()?;
        debug!(config = ?config, "resolved configuration");
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn check(&self) -> Result<()> {
        let scores = self.scores;
        if scores.min > scores.max {
            bail!("score bound min {} exceeds max {}", scores.min, scores.max);
        }
        if scores.min <= self.legacy.unscored {
            bail!(
                "score bound min {} must stay above the unscored value {}",
                scores.min,
                self.legacy.unscored
            );
        }

        let legacy = self.legacy;
        if legacy.min > legacy.max {
            bail!("legacy bound min {} exceeds max {}", legacy.min, legacy.max);
        }
        if (legacy.min..=legacy.max).contains(&legacy.sentinel) {
            bail!("legacy sentinel {} lies inside the legacy bound", legacy.sentinel);
        }

        let level = self.analysis.significance_level;
        if !(level > 0.0 && level < 1.0) {
            bail!("significance level must be in (0, 1), got {level}");
        }

        Ok(())
    }
}
