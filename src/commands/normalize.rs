use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::NormalizeArgs;
use crate::commands::open_store;
use crate::config::AppConfig;
use crate::normalize::ScoreNormalizer;

pub fn run(config: &AppConfig, args: NormalizeArgs) -> Result<()> {
    let mut store = open_store(config)?;
    let normalizer = ScoreNormalizer::new(config.legacy);

    let repaired = normalizer
        .normalize_existing(&mut store, &args.rater_id)
        .with_context(|| format!("failed to normalize ratings for {}", args.rater_id))?;

    if repaired > 0 {
        warn!(
            rater_id = %args.rater_id,
            repaired,
            flagged_total = store.count_needs_review()?,
            "repaired rows are flagged for manual review"
        );
    } else {
        info!(rater_id = %args.rater_id, "no ratings needed repair");
    }

    println!("{repaired}");
    Ok(())
}
