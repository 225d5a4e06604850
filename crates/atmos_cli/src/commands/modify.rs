//! Add and remove command implementation.

use super::{connect, load_config, runtime};
use atmos_catalog::CatalogConfig;
use atmos_store::{CatalogDatabase, CatalogRecord, WriteBatch};
use std::path::Path;
use tracing::info;

/// Which way the catalog changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Insert names.
    Add,
    /// Delete names.
    Remove,
}

/// Builds the batch for `names`. Every added name must decompose into
/// the configured name fields.
pub fn batch(
    config: &CatalogConfig,
    change: Change,
    names: Vec<String>,
) -> Result<WriteBatch, Box<dyn std::error::Error>> {
    let schema = config.schema()?;
    Ok(match change {
        Change::Add => {
            let records = names
                .iter()
                .map(|name| {
                    CatalogRecord::from_name(&schema, name).map_err(|e| format!("{name}: {e}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            WriteBatch::insert(&schema, records)
        }
        Change::Remove => WriteBatch::delete_by_name(&schema, names),
    })
}

/// Runs the add or remove command.
pub fn run(
    path: &Path,
    change: Change,
    names: Vec<String>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let batch = batch(&config, change, names)?;

    if dry_run {
        println!("{batch}");
        return Ok(());
    }

    let outcome = runtime()?.block_on(async {
        let db = connect(&config).await?;
        Ok::<_, Box<dyn std::error::Error>>(db.execute_batch(&batch).await?)
    })?;
    info!(affected = outcome.affected, skipped = outcome.skipped, "batch applied");
    println!(
        "{} row(s) affected, {} already cataloged",
        outcome.affected, outcome.skipped
    );
    Ok(())
}
