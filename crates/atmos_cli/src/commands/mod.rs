//! CLI command implementations.

pub mod check_config;
pub mod compile;
pub mod filters;
pub mod modify;

use atmos_catalog::CatalogConfig;
use atmos_store::MySqlCatalog;
use std::path::Path;
use tokio::runtime::Runtime;

/// Loads and validates the configuration file.
pub fn load_config(path: &Path) -> Result<CatalogConfig, Box<dyn std::error::Error>> {
    CatalogConfig::from_file(path).map_err(|e| format!("{}: {e}", path.display()).into())
}

/// Creates the single-threaded runtime database commands run on.
pub fn runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Connects to the configured database.
pub async fn connect(config: &CatalogConfig) -> Result<MySqlCatalog, Box<dyn std::error::Error>> {
    let catalog = MySqlCatalog::connect(&config.database.to_mysql_options(), config.schema()?).await?;
    Ok(catalog)
}
