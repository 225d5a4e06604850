//! Filters command implementation.

use super::{connect, load_config, runtime};
use atmos_store::{CatalogDatabase, SelectQuery};
use serde_json::{Map, Value};
use std::path::Path;

/// Runs the filters command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let menu = runtime()?.block_on(async {
        let db = connect(&config).await?;
        let mut menu = Vec::new();
        for category in &config.filter_category_names {
            let query = SelectQuery::new(&config.database.table, category.as_str()).distinct();
            let values = db.execute(&query).await?;
            let mut entry = Map::new();
            entry.insert(
                category.clone(),
                Value::Array(values.into_iter().map(Value::String).collect()),
            );
            menu.push(Value::Object(entry));
        }
        Ok::<_, Box<dyn std::error::Error>>(Value::Array(menu))
    })?;
    println!("{}", serde_json::to_string_pretty(&menu)?);
    Ok(())
}
