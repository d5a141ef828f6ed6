//! pgmongo-migrate CLI
//!
//! Copies PostgreSQL tables into MongoDB collections, one document per row.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pgmongo_migrate::config::EXAMPLE_CONFIG;
use pgmongo_migrate::pipeline::connect_source;
use pgmongo_migrate::retry::RetryConfig;
use pgmongo_migrate::{resolve_tables, MigrationConfig, Pipeline, RowSource, TableSelection};

#[derive(Parser)]
#[command(name = "pgmongo-migrate")]
#[command(version)]
#[command(about = "Copy PostgreSQL tables into MongoDB collections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "config.yml", global = true)]
    config: PathBuf,

    /// Dry run mode (read every row, write nothing)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of tables transferred concurrently
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Cancel the run after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// PostgreSQL password override
    #[arg(long, env = "PGPASSWORD", hide_env_values = true, global = true)]
    pg_password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration (default)
    Run,

    /// Validate configuration file
    Validate,

    /// List the tables a run would migrate
    Tables,

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "config.yml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match &cli.command {
        Some(Commands::Init { output }) => generate_config(output)?,
        Some(Commands::Validate) => validate_config(&cli)?,
        Some(Commands::Tables) => list_tables(&cli).await?,
        Some(Commands::Run) | None => {
            if !run_migration(&cli).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads the config file and applies command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<MigrationConfig> {
    info!("Loading configuration from {:?}", cli.config);

    let mut config = MigrationConfig::from_file(&cli.config)?;

    if let Some(password) = &cli.pg_password {
        config.postgres.password.clone_from(password);
    }
    if cli.dry_run {
        config.options.dry_run = true;
    }
    if let Some(workers) = cli.workers {
        config.options.workers = workers;
    }
    if cli.timeout_secs.is_some() {
        config.options.timeout_secs = cli.timeout_secs;
    }

    config.validate()?;
    Ok(config)
}

async fn run_migration(cli: &Cli) -> anyhow::Result<bool> {
    let config = load_config(cli)?;
    let pipeline = Pipeline::from_config(&config).await?;

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, config.options.timeout());

    let report = pipeline.run(cancel.clone()).await;
    cancel.cancel();
    pipeline.close().await;
    let report = report?;

    println!();
    for result in &report.results {
        println!("{}", result.status_line());
    }

    let failed = report.failed().count();
    println!();
    if failed == 0 {
        println!("Migration complete!");
    } else {
        println!("Migration finished with {} failed table(s)", failed);
    }
    println!("   Tables:     {}", report.results.len());
    println!("   Documents:  {}", report.total_rows());
    println!("   Failed:     {}", failed);
    println!("   Duration:   {:.2}s", report.duration_secs);
    println!("   Throughput: {:.0} docs/sec", report.throughput());
    if config.options.dry_run {
        println!("   (dry run: nothing was written)");
    }

    Ok(report.is_success())
}

/// Cancels `cancel` on Ctrl-C or once `timeout` elapses.
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupt received, cancelling migration");
                    token.cancel();
                }
            }
        }
    });

    if let Some(timeout) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!("Timeout of {:?} reached, cancelling migration", timeout);
                    token.cancel();
                }
            }
        });
    }
}

fn validate_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let pg = &config.postgres;

    println!("Configuration is valid!");
    println!(
        "   Source:      postgres://{}@{}:{}/{} (schema {})",
        pg.user, pg.host, pg.port, pg.database, pg.schema
    );
    if pg.all_tables {
        println!("   Tables:      all base tables");
    } else {
        println!("   Tables:      {}", pg.tables.join(", "));
    }
    println!("   Destination: database {}", config.mongodb.database);
    println!("   Workers:     {}", config.options.workers);

    Ok(())
}

async fn list_tables(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let retry = RetryConfig::for_connections(config.options.connect_retries);
    let source = connect_source(&config.postgres, &retry).await?;

    let selection = TableSelection::from(&config.postgres);
    let tables = resolve_tables(&selection, &source).await;
    source.close().await;
    let tables = tables?;

    println!("{} table(s) in schema {}:", tables.len(), source.schema());
    for table in &tables {
        println!("   - {}", table);
    }

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists, refusing to overwrite", output.display());
    }

    std::fs::write(output, EXAMPLE_CONFIG)?;
    println!("Generated configuration: {}", output.display());
    println!(
        "   Edit the file and run: pgmongo-migrate --config {} run",
        output.display()
    );

    Ok(())
}
