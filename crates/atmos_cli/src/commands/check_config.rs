//! Check-config command implementation.

use super::load_config;
use atmos_catalog::CatalogConfig;
use serde::Serialize;
use std::path::Path;

/// Summary of a validated configuration.
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    /// Catalog prefix.
    pub prefix: String,
    /// Catalog instance id.
    pub catalog_id: String,
    /// Signing identity, if not the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_id: Option<String>,
    /// Filter menu categories.
    pub filter_categories: Vec<String>,
    /// Ordered name fields.
    pub name_fields: Vec<String>,
    /// Database server.
    pub db_server: String,
    /// Catalog table.
    pub table: String,
    /// Sync group prefix.
    pub sync_prefix: String,
    /// Table definition.
    pub create_table: String,
}

impl ConfigSummary {
    /// Summarizes `config`.
    pub fn new(config: &CatalogConfig) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            prefix: config.prefix.to_uri(),
            catalog_id: config.catalog_id.clone(),
            signing_id: config.signing_id.as_ref().map(|n| n.to_uri()),
            filter_categories: config.filter_category_names.clone(),
            name_fields: config.name_fields().to_vec(),
            db_server: config.database.db_server.clone(),
            table: config.database.table.clone(),
            sync_prefix: config.sync.prefix.to_uri(),
            create_table: config.schema()?.create_table_sql(),
        })
    }
}

/// Runs the check-config command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let summary = ConfigSummary::new(&config)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            println!("Configuration OK: {}", path.display());
            println!("  prefix:        {}", summary.prefix);
            println!("  catalog id:    {}", summary.catalog_id);
            println!(
                "  signing id:    {}",
                summary.signing_id.as_deref().unwrap_or("(default)")
            );
            println!("  filters:       {}", summary.filter_categories.join(", "));
            println!("  name fields:   {}", summary.name_fields.join("/"));
            println!("  database:      {} ({})", summary.db_server, summary.table);
            println!("  sync prefix:   {}", summary.sync_prefix);
            println!();
            println!("{}", summary.create_table);
        }
    }
    Ok(())
}
