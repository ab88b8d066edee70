use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lineascope_core::Config;
use lineascope_engine::{MetadataBuilder, TraceEngine};
use lineascope_store::{MetadataStore, PostgresStore};

/// Lineascope - data lineage tracing for SQL warehouses
#[derive(Parser)]
#[command(name = "lineascope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: lineascope.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store connection string (overrides config and LINEASCOPE_STORE_URL)
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild lineage metadata from transformation scripts
    Build {
        /// Directory of .sql scripts (default: from config)
        #[arg(short, long)]
        sql_dir: Option<PathBuf>,
    },

    /// List schemas in the backing store
    Schemas,

    /// List tables, optionally filtered to one schema
    Tables {
        #[arg(short, long)]
        schema: Option<String>,
    },

    /// Show column names and types for a table
    Describe { table: String },

    /// Count rows in a table
    Count { table: String },

    /// Trace how a column is derived
    Trace { table: String, column: String },

    /// List the tables feeding a target
    Upstream { table: String },

    /// Expand the full upstream dependency tree of a target
    Tree {
        table: String,

        /// Maximum expansion depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Check the health of a target's source tables
    Sources { table: String },

    /// Fetch one row by key column and value
    Inspect {
        table: String,
        key_column: String,
        key_value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("lineascope.toml").exists() {
        Config::from_file(Path::new("lineascope.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    let store = connect_store(&cli, &config).await?;
    let engine = TraceEngine::from_config(Arc::clone(&store), &config);

    match cli.command {
        Commands::Build { sql_dir } => {
            let sql_dir = sql_dir.unwrap_or_else(|| config.resolved_sql_dir());
            let builder =
                MetadataBuilder::new(Arc::clone(&store)).with_namespace(config.metadata.clone());

            let summary = builder.build_dir(&sql_dir).await?;
            println!(
                "{} {} script file(s), {} target table(s), {} table fact(s), {} column fact(s)",
                "Build complete:".green(),
                summary.script_files,
                summary.distinct_targets,
                summary.table_facts,
                summary.column_facts
            );
        }

        Commands::Schemas => {
            for schema in engine.list_schemas().await? {
                println!("{schema}");
            }
        }

        Commands::Tables { schema } => {
            for table in engine.list_tables(schema.as_deref()).await? {
                println!("{table}");
            }
        }

        Commands::Describe { table } => {
            for column in engine.describe_columns(&table).await? {
                println!("{}  {}", column.name.cyan(), column.data_type);
            }
        }

        Commands::Count { table } => {
            println!("{}", engine.count_rows(&table).await?);
        }

        Commands::Trace { table, column } => {
            let outcome = engine.trace_column_lineage(&table, &column).await?;
            if outcome.is_found() {
                println!("{}", outcome.render());
            } else {
                println!("{}", outcome.render().yellow());
            }
        }

        Commands::Upstream { table } => {
            let upstream = engine.get_upstream_tables(&table).await?;
            if upstream.is_empty() {
                println!(
                    "{}",
                    format!("No upstream tables recorded for {table}").yellow()
                );
            } else {
                for source in upstream {
                    println!("{source}");
                }
            }
        }

        Commands::Tree { table, depth } => {
            let tree = engine.get_lineage_tree(&table, depth).await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }

        Commands::Sources { table } => {
            let report = engine.check_table_sources(&table).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Inspect {
            table,
            key_column,
            key_value,
        } => {
            let lookup = engine.inspect_row(&table, &key_column, &key_value).await?;
            println!("{}", serde_json::to_string_pretty(&lookup)?);
        }
    }

    Ok(())
}

/// Resolve the store connection and open it
///
/// Precedence: --store-url, then LINEASCOPE_STORE_URL, then the config's
/// [store] section.
async fn connect_store(cli: &Cli, config: &Config) -> Result<Arc<dyn MetadataStore>> {
    let url = cli
        .store_url
        .clone()
        .or_else(|| std::env::var("LINEASCOPE_STORE_URL").ok())
        .or_else(|| config.store.as_ref().and_then(|store| store.url.clone()));

    let Some(url) = url else {
        anyhow::bail!(
            "no store configured: pass --store-url, set LINEASCOPE_STORE_URL, \
             or add a [store] url to lineascope.toml"
        );
    };

    let store = PostgresStore::from_connection_string(&url).await?;
    Ok(Arc::new(store))
}
