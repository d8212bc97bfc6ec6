//! resumecp - resumable chunked file copy
//!
//! Copies large files and directory trees chunk by chunk, checkpointing
//! progress next to the destination so an interrupted run picks up where it
//! stopped when the same command is run again.

mod display;
mod progress;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use resumecp_config::{Config, ConfigLoader, LoggingConfig};
use resumecp_engine::{copy_path, CancellationGate, CopyOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use crate::display::print_copy_stats;
use crate::progress::ConsoleReporter;

/// Exit status after an interrupt, following the SIGINT convention
const EXIT_INTERRUPTED: u8 = 130;

/// resumecp - resumable chunked file copy
#[derive(Parser)]
#[command(
    name = "resumecp",
    version = env!("CARGO_PKG_VERSION"),
    about = "Resumable chunked file copy",
    long_about = "resumecp copies large files and directory trees in adaptively sized chunks.\n\
                  Progress is checkpointed next to each destination file, so an interrupted\n\
                  copy resumes when the same command is run again."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file or directory tree into a destination directory
    Copy {
        /// Source file or directory
        source: PathBuf,
        /// Destination directory, created if missing
        #[arg(default_value = ".")]
        destination: PathBuf,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };

    init_logging(cli.debug, cli.quiet, cli.verbose, &config.logging)?;

    info!("resumecp v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Copy {
            source,
            destination,
        } => copy_command(source, destination, &config, cli.quiet).await,
        Commands::Config { default } => {
            config_command(default, &config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(debug: bool, quiet: bool, verbose: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    // Logs go to stderr; stdout carries the progress lines
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.with_ansi(logging.colored_output).init();
    }

    Ok(())
}

async fn copy_command(
    source: PathBuf,
    destination: PathBuf,
    config: &Config,
    quiet: bool,
) -> Result<ExitCode> {
    info!("Source: {}", source.display());
    info!("Destination: {}", destination.display());

    let options = CopyOptions::from_config(config);
    let gate = CancellationGate::new();
    let listener = gate.listen_for_interrupt();
    let reporter = ConsoleReporter::new(quiet, config.logging.colored_output);

    let result = copy_path(&source, &destination, &options, &gate, &reporter).await;
    listener.abort();
    reporter.finish();
    let summary = result?;

    if summary.interrupted {
        println!("Aborted, run this command again to resume copying.");
        if let Some(checkpoint) = &summary.checkpoint {
            info!("Progress saved to {}", checkpoint.display());
        }
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }

    if !quiet {
        print_copy_stats(&summary.stats);
    }

    info!("Copy operation completed successfully");
    Ok(ExitCode::SUCCESS)
}

fn config_command(default: bool, config: &Config) -> Result<()> {
    let (title, yaml) = if default {
        ("Default configuration:", serde_yaml::to_string(&Config::default())?)
    } else {
        ("Current configuration:", serde_yaml::to_string(config)?)
    };

    println!("{} {}", style("⚙").blue().bold(), title);
    print!("{}", yaml);
    Ok(())
}
