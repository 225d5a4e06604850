//! NDN-Atmos catalog CLI
//!
//! Operator tools for a catalog deployment.
//!
//! # Commands
//!
//! - `check-config` - Validate a configuration file and show the schema
//! - `compile` - Show the statement a JSON query compiles to
//! - `filters` - Print the filter menu from the live database
//! - `add` / `remove` - Insert or delete dataset names directly

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NDN-Atmos catalog operator tools.
#[derive(Parser)]
#[command(name = "atmos-catalog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the catalog configuration file
    #[arg(global = true, short, long, default_value = "catalog.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and show the catalog schema
    CheckConfig {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compile a JSON query and print the resulting statement
    Compile {
        /// Query text, e.g. '{"activity":"CMIP5"}'
        query: String,
    },

    /// Print the filter menu built from the database
    Filters,

    /// Catalog dataset names
    Add {
        /// Fully-qualified dataset names
        #[arg(required = true)]
        names: Vec<String>,

        /// Print the statement instead of running it
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove dataset names from the catalog
    Remove {
        /// Fully-qualified dataset names
        #[arg(required = true)]
        names: Vec<String>,

        /// Print the statement instead of running it
        #[arg(short, long)]
        dry_run: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CheckConfig { format } => commands::check_config::run(&cli.config, &format)?,
        Commands::Compile { query } => commands::compile::run(&cli.config, &query)?,
        Commands::Filters => commands::filters::run(&cli.config)?,
        Commands::Add { names, dry_run } => {
            commands::modify::run(&cli.config, commands::modify::Change::Add, names, dry_run)?;
        }
        Commands::Remove { names, dry_run } => {
            commands::modify::run(&cli.config, commands::modify::Change::Remove, names, dry_run)?;
        }
    }

    Ok(())
}
