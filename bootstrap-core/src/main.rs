use std::path::PathBuf;

use anyhow::{Context, Result};
use bootstrap_core::command::CommandLine;
use bootstrap_core::config::{BootstrapConfig, ConfigOverrides, LogFormat, RestorePolicy};
use bootstrap_core::error::report_failure;
use bootstrap_core::handoff::ExecLauncher;
use bootstrap_core::migrations::CommandMigrator;
use bootstrap_core::observability::setup_logging;
use bootstrap_core::readiness::{TcpProbe, TokioClock};
use bootstrap_core::restore::CommandRestorer;
use bootstrap_core::state::PgStateDetector;
use bootstrap_core::{BootstrapError, Bootstrapper, Collaborators};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Prepares the database and hands off to the application server",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Restore the reference dump after a fresh migration")]
    load_dump: bool,

    #[arg(long, value_enum, help = "How restore failures are judged")]
    restore_policy: Option<CliRestorePolicy>,

    #[arg(long, value_enum, help = "Log output format")]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRestorePolicy {
    Strict,
    Lenient,
}

impl From<CliRestorePolicy> for RestorePolicy {
    fn from(value: CliRestorePolicy) -> Self {
        match value {
            CliRestorePolicy::Strict => RestorePolicy::Strict,
            CliRestorePolicy::Lenient => RestorePolicy::Lenient,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Wait for the database, migrate, restore and start the server")]
    Run,
    #[command(about = "Wait for the database and print whether it is initialized")]
    Status,
    #[command(about = "Print the resolved configuration with secrets redacted")]
    PrintConfig,
}

fn main() {
    let cli = Cli::parse();

    let code = match execute(cli) {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %format!("{:#}", err), "bootstrap failed");
            eprintln!("db-bootstrap: {:#}", err);
            report_failure(&err, &mut std::io::stdout())
        }
    };
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<()> {
    let overrides = ConfigOverrides {
        load_dump: cli.load_dump.then_some(true),
        restore_policy: cli.restore_policy.map(Into::into),
        log_format: cli.log_format.map(Into::into),
    };

    let config = match BootstrapConfig::load(cli.config.as_deref(), |key| std::env::var(key).ok(), &overrides) {
        Ok(config) => config,
        Err(err) => {
            setup_logging(overrides.log_format.unwrap_or_default());
            return Err(err).context("loading configuration");
        }
    };
    setup_logging(config.logging.format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BootstrapError::from)?;

    runtime.block_on(dispatch(cli.command.unwrap_or(Commands::Run), &config))
}

async fn dispatch(command: Commands, config: &BootstrapConfig) -> Result<()> {
    if let Commands::PrintConfig = command {
        print!("{}", config.redacted().to_toml()?);
        return Ok(());
    }

    let migrator = CommandMigrator::new(
        CommandLine::from_parts(&config.migration.command)
            .context("migration.command is empty")?,
        config.database.url_env.clone(),
    );
    let restorer = CommandRestorer::new(
        CommandLine::from_parts(&config.restore.command).context("restore.command is empty")?,
        config.restore.log_path.clone(),
        config.restore.error_log_path.clone(),
    );
    let probe = TcpProbe::default();
    let detector =
        PgStateDetector::new(config.database.url.clone()).with_schema(config.sentinel_schema.clone());

    let bootstrapper = Bootstrapper::new(
        config,
        Collaborators {
            probe: &probe,
            clock: &TokioClock,
            detector: &detector,
            migrator: &migrator,
            restorer: &restorer,
            launcher: &ExecLauncher,
        },
    );

    match command {
        Commands::Status => {
            let state = bootstrapper.status().await?;
            println!("{}", state);
        }
        _ => {
            info!(
                address = %config.target().address(),
                sentinel = %config.sentinel_table,
                load_dump = config.restore.enabled,
                "starting database bootstrap"
            );
            bootstrapper.run().await?;
        }
    }
    Ok(())
}
