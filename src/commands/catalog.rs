use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::catalog::SampleCatalog;
use crate::cli::CatalogArgs;
use crate::config::AppConfig;
use crate::util::write_json_pretty;

pub fn run(config: &AppConfig, args: CatalogArgs) -> Result<()> {
    let catalog = SampleCatalog::new(&config.paths)
        .load()
        .context("failed to load sample catalog")?;

    if catalog.is_empty() {
        warn!(source = ?catalog.source, "catalog resolved to zero samples");
    }
    info!(
        samples = catalog.len(),
        warnings = catalog.warnings.len(),
        source = ?catalog.source,
        fingerprint = %catalog.fingerprint(),
        "catalog resolved"
    );

    if let Some(output_path) = &args.output_path {
        write_json_pretty(output_path, &catalog)?;
        info!(path = %output_path.display(), "wrote catalog snapshot");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        for sample in &catalog.samples {
            println!(
                "{}\t{}\t{} chars",
                sample.id,
                sample.image_reference,
                sample.text.chars().count()
            );
        }
    }

    Ok(())
}
