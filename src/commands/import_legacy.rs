use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::ImportLegacyArgs;
use crate::commands::open_store;
use crate::config::AppConfig;

pub fn run(config: &AppConfig, args: ImportLegacyArgs) -> Result<()> {
    if !args.legacy_db_path.exists() {
        bail!(
            "legacy database not found: {}",
            args.legacy_db_path.display()
        );
    }

    let mut store = open_store(config)?;
    let summary = store
        .import_legacy(&args.legacy_db_path)
        .with_context(|| format!("failed to import {}", args.legacy_db_path.display()))?;

    info!(
        source = %args.legacy_db_path.display(),
        rows_read = summary.rows_read,
        rows_applied = summary.rows_applied,
        rows_skipped = summary.rows_skipped,
        "legacy import finished"
    );
    if summary.rows_flagged > 0 {
        warn!(
            rows_flagged = summary.rows_flagged,
            "imported rows outside the score bounds; run normalize for the affected raters"
        );
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
