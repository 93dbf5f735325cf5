use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::store::RatingStore;
use crate::util::ensure_directory;

pub mod analyze;
pub mod catalog;
pub mod export;
pub mod import_legacy;
pub mod normalize;
pub mod reset;
pub mod status;
pub mod submit;

fn open_store(config: &AppConfig) -> Result<RatingStore> {
    let db_path = config.paths.db_path();
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }

    RatingStore::open(&db_path, config.scores)
        .with_context(|| format!("failed to open rating store {}", db_path.display()))
}
