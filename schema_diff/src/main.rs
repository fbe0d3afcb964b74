use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use schema_diff::config::{self, LoggingConfig};
use schema_diff::schema::checksum::SchemaChecksum;
use schema_diff::utils::logging::{init_logging, init_stderr_logging};
use schema_diff::utils::naming::label_from_path;
use schema_diff::{DiffOptions, SchemaDiffClient};

/// Compute the DDL that turns one MySQL schema into another
#[derive(Parser, Debug)]
#[command(name = "schema_diff", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "schema_diff.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Diff two schema dump files through scratch databases
    Files {
        from: PathBuf,
        to: PathBuf,
        /// Apply the DDL to the scratch copy of <FROM> and verify the checksums converge
        #[arg(long)]
        validate: bool,
        /// Write the DDL to this file
        #[arg(long)]
        dml_file: Option<PathBuf>,
        /// Stamp the DML file with the generation time
        #[arg(long, requires = "dml_file")]
        dml_timestamp: bool,
        /// Write a JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Diff two databases on the configured server
    Databases {
        from_db: String,
        to_db: String,
        /// Apply the DDL to <FROM_DB> and verify the checksums converge
        #[arg(long)]
        apply: bool,
        /// Write the DDL to this file
        #[arg(long)]
        dml_file: Option<PathBuf>,
        /// Stamp the DML file with the generation time
        #[arg(long, requires = "dml_file")]
        dml_timestamp: bool,
    },
    /// Print the checksum of a database and write its artifacts
    Checksum { database: String },
    /// Print the canonical form and checksum of a local dump file
    Normalize { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Files {
            from,
            to,
            validate,
            dml_file,
            dml_timestamp,
            report,
        } => {
            check_schema_files(&from, &to)?;
            let from_sql = std::fs::read_to_string(&from)
                .with_context(|| format!("failed to read {}", from.display()))?;
            let to_sql = std::fs::read_to_string(&to)
                .with_context(|| format!("failed to read {}", to.display()))?;

            let client = connect(&cli.config).await?;
            let options = DiffOptions {
                validate,
                dml_file,
                dml_timestamp,
            };
            let result = client
                .diff_schema_texts(
                    &label_from_path(&from),
                    &from_sql,
                    &label_from_path(&to),
                    &to_sql,
                    &options,
                )
                .await?;

            print_statements(&result.statements);
            if let Some(path) = report {
                result.write_json(&path)?;
            }
        }
        Command::Databases {
            from_db,
            to_db,
            apply,
            dml_file,
            dml_timestamp,
        } => {
            let client = connect(&cli.config).await?;
            let options = DiffOptions {
                validate: apply,
                dml_file,
                dml_timestamp,
            };
            let result = client.diff_databases(&from_db, &to_db, &options).await?;
            print_statements(&result.statements);
        }
        Command::Checksum { database } => {
            let client = connect(&cli.config).await?;
            let checksum = client.checksum_database(&database).await?;
            println!("{}", checksum.checksum);
        }
        Command::Normalize { file } => {
            // stdout carries the canonical form
            init_stderr_logging(&default_logging())?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let checksum = SchemaChecksum::compute(raw);
            println!("{}", checksum.sorted);
            println!("checksum: {}", checksum.checksum);
        }
    }

    Ok(())
}

/// Load the configuration, start logging and connect to the server
async fn connect(config_path: &Path) -> anyhow::Result<SchemaDiffClient> {
    let config = config::load_from_file(&config_path.to_string_lossy())?;
    init_logging(&Some(config.logging.clone().unwrap_or_else(default_logging)))?;

    let client = SchemaDiffClient::new(config)
        .await
        .context("failed to connect to the database server")?;
    Ok(client)
}

fn print_statements(statements: &[String]) {
    for statement in statements {
        println!("{}", statement);
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: "info".to_string(),
        file: None,
        format: "text".to_string(),
        stdout: true,
    }
}

/// Both paths must be distinct regular files
fn check_schema_files(from: &Path, to: &Path) -> anyhow::Result<()> {
    for path in [from, to] {
        if !path.is_file() {
            bail!("{} is not a regular file", path.display());
        }
    }
    if from.canonicalize()? == to.canonicalize()? {
        bail!("{} and {} are the same file", from.display(), to.display());
    }
    Ok(())
}
