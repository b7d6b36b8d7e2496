//! sqlsage CLI - inspect, query and persist SQLite databases

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sqlsage::config::{load_config, SqlsageConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sqlsage")]
#[command(version)]
#[command(about = "Inspect, query and persist SQLite databases, or ask them questions in plain language")]
#[command(long_about = r#"
sqlsage opens a SQLite database (or builds one from a .sql script) and lets you:
  • Browse tables, columns, keys and sample rows
  • Run SQL and see rows or a status
  • Ask questions that an external model translates into SQL
  • Save, back up and export the database file

Example usage:
  sqlsage info -d shop.db
  sqlsage query -d dump.sql "SELECT COUNT(*) FROM orders"
  sqlsage ask -d shop.db "Which customer spent the most?"
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (defaults to ./sqlsage.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sqlsage.toml in the current directory
    Init {
        /// Default database for later commands
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show every table with its columns, a preview and a row count
    Info {
        /// Database file (.db, .sqlite, .sqlite3) or SQL script (.sql)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Rows to preview per table
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the schema overview, foreign keys included
    Schema {
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Execute SQL
    Query {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// SQL text
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        sql: Option<String>,

        /// Read SQL from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Roll back the whole batch if any statement fails
        #[arg(long, conflicts_with = "each")]
        atomic: bool,

        /// Run every statement independently and report each
        #[arg(long)]
        each: bool,
    },

    /// Ask a question; the configured translator writes the SQL
    Ask {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Question in plain language
        question: String,

        /// Also ask the translator to explain the result
        #[arg(short, long)]
        explain: bool,
    },

    /// Save the database to a new file
    Save {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Destination file
        dest: PathBuf,
    },

    /// Copy the database to a timestamped backup next to it
    Backup {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Explicit backup path
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Export the database bytes and print their size and digest
    Export {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Write the bytes to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Create a new database from table definitions
    Create {
        /// Database name; `.db` is added when there is no extension
        name: String,

        /// TOML file with [[table]] entries
        #[arg(short, long)]
        spec: PathBuf,

        /// Create in the current directory instead of a temporary one
        #[arg(short, long)]
        permanent: bool,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a `{"status":"success","command":…,"data":…}` envelope
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "status": "success",
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

/// Database from the flag, else from the config file
fn resolve_database(flag: Option<PathBuf>, config: &SqlsageConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    match &config.database {
        Some(db) => Ok(PathBuf::from(db)),
        None => anyhow::bail!("no database given: pass --database or set `database` in sqlsage.toml"),
    }
}

fn load(path: Option<&Path>) -> anyhow::Result<SqlsageConfig> {
    let config = load_config(path).context("failed to read config")?;
    if config.is_none() {
        if let Some(path) = path {
            anyhow::bail!("config file {} not found", path.display());
        }
    }
    Ok(config.unwrap_or_default())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; logs go to stderr so stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { database, force } => {
            commands::run_init(output_mode, config_path, database, force)
        }
        Commands::Info { database, limit } => {
            let config = load(config_path)?;
            let db = resolve_database(database, &config)?;
            commands::run_info(output_mode, &db, limit.unwrap_or_else(|| config.preview_limit()))
        }
        Commands::Schema { database } => {
            let config = load(config_path)?;
            commands::run_schema(output_mode, &resolve_database(database, &config)?)
        }
        Commands::Query { database, sql, file, atomic, each } => {
            let config = load(config_path)?;
            let db = resolve_database(database, &config)?;
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                (None, None) => anyhow::bail!("no SQL given"),
            };
            let mode = if each {
                commands::QueryMode::Each
            } else if atomic {
                commands::QueryMode::Atomic
            } else {
                commands::QueryMode::Default
            };
            commands::run_query(output_mode, &db, &sql, mode)
        }
        Commands::Ask { database, question, explain } => {
            let config = load(config_path)?;
            let db = resolve_database(database, &config)?;
            let translator = config
                .translator()
                .context("no translator configured: add a [translator] section to sqlsage.toml")?;
            commands::run_ask(output_mode, &db, &translator, &question, explain)
        }
        Commands::Save { database, dest } => {
            let config = load(config_path)?;
            commands::run_save(output_mode, &resolve_database(database, &config)?, &dest)
        }
        Commands::Backup { database, to } => {
            let config = load(config_path)?;
            commands::run_backup(output_mode, &resolve_database(database, &config)?, to.as_deref())
        }
        Commands::Export { database, out } => {
            let config = load(config_path)?;
            commands::run_export(output_mode, &resolve_database(database, &config)?, out.as_deref())
        }
        Commands::Create { name, spec, permanent } => {
            commands::run_create(output_mode, &name, &spec, permanent)
        }
        Commands::Version => commands::run_version(output_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_needs_sql_or_file() {
        assert!(Cli::try_parse_from(["sqlsage", "query", "-d", "a.db"]).is_err());
        assert!(Cli::try_parse_from(["sqlsage", "query", "-d", "a.db", "SELECT 1"]).is_ok());
        assert!(Cli::try_parse_from(["sqlsage", "query", "--file", "x.sql"]).is_ok());
        assert!(Cli::try_parse_from(["sqlsage", "query", "--atomic", "--each", "SELECT 1"]).is_err());
    }

    #[test]
    fn test_resolve_database() {
        let config = SqlsageConfig {
            database: Some("from_config.db".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_database(Some(PathBuf::from("flag.db")), &config).unwrap(),
            PathBuf::from("flag.db")
        );
        assert_eq!(resolve_database(None, &config).unwrap(), PathBuf::from("from_config.db"));
        assert!(resolve_database(None, &SqlsageConfig::default()).is_err());
    }
}
