use anyhow::{Result, bail};
use tracing::warn;

use crate::cli::ResetArgs;
use crate::commands::open_store;
use crate::config::AppConfig;

pub fn run(config: &AppConfig, args: ResetArgs) -> Result<()> {
    if !args.yes {
        bail!("reset deletes every stored rating; pass --yes to confirm");
    }

    let mut store = open_store(config)?;
    let deleted = store.reset()?;
    warn!(deleted, "all ratings deleted");

    println!("{deleted}");
    Ok(())
}
