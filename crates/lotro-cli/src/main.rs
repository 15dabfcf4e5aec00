use clap::Parser;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use lotro_cli::{Commands, OutputFormat, commands};

#[derive(Parser)]
#[command(
    name = "lotro-update",
    about = "Inspect LOTRO .dat archives and download content updates",
    version,
    long_about = "A command-line tool for reading LOTRO .dat archive metadata and applying manifest-driven content updates (splashscreens and game files) to an installation."
)]
struct Cli {
    /// Set the logging level (RUST_LOG takes precedence)
    #[arg(short, long, value_enum, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

fn init_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level.into()).into())
        .from_env_lossy();

    // Logs go to stderr so stdout stays machine readable
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_level, cli.json_logs);

    match cli.command {
        Commands::Scan { dir, recursive } => {
            commands::archive::scan(&dir, recursive, cli.format)?;
        }
        Commands::Inspect {
            file,
            id,
            extract,
            limit,
        } => commands::archive::inspect(&file, id, extract.as_ref(), limit, cli.format)?,
        Commands::Splash {
            install,
            manifest_url,
        } => commands::patch::splash(&install, &manifest_url, cli.format).await?,
        Commands::Fetch {
            install,
            manifest_url,
            base_url,
        } => commands::patch::fetch(&install, &manifest_url, &base_url, cli.format).await?,
        Commands::Check {
            root,
            targets,
            recursive,
        } => {
            // Exit status 2 signals archives behind their targets
            if !commands::archive::check(&root, targets, recursive, cli.format)? {
                return Ok(ExitCode::from(2));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
