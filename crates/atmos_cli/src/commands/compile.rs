//! Compile command implementation.

use super::load_config;
use atmos_catalog::{QueryCompiler, QueryShape};
use std::path::Path;

/// Runs the compile command.
pub fn run(path: &Path, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let compiler = QueryCompiler::from_config(&config)?;
    let compiled = compiler.compile(query)?;

    let shape = match compiled.shape {
        QueryShape::Filter => "filter".to_string(),
        QueryShape::PrefixSearch => "prefix search".to_string(),
        QueryShape::Autocomplete { last_component } => {
            format!("autocomplete (last component: {last_component})")
        }
    };
    println!("shape:     {shape}");
    println!("statement: {}", compiled.query);
    println!("bound:     {}", compiled.query.to_sql());
    Ok(())
}
