//! Stackmend CLI
//!
//! A command-line tool for inspecting stuck stacks, remediating them,
//! gating deployments on environment health and monitoring rollouts.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commands::{fix, gate, inspect, monitor};
use mend_lib::{AwsCli, Backends, EngineConfig, Session};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for execution failures, including misuse and bad configuration
const EXIT_FAILURE: u8 = 3;

/// Stackmend CLI
#[derive(Parser)]
#[command(name = "stackmend")]
#[command(author, version, about = "Stuck stack remediation and deployment health gating", long_about = None)]
pub struct Cli {
    /// Environment whose stacks and services are checked
    #[arg(long, short)]
    pub environment: String,

    /// Path to a TOML config file (defaults to ~/.config/stackmend/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Provider region (can also be set via AWS_REGION env var)
    #[arg(long, env = "AWS_REGION", global = true)]
    pub region: Option<String>,

    /// Provider credentials profile (can also be set via AWS_PROFILE env var)
    #[arg(long, env = "AWS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect stacks and report which are stuck
    Inspect {
        /// Inspect only this stack
        #[arg(long)]
        stack_name: Option<String>,

        /// Treat any in-progress stack as stuck regardless of age
        #[arg(long)]
        treat_in_progress_as_stuck: bool,
    },

    /// Remediate stuck resources and continue, cancel or delete stuck stacks
    Fix {
        /// Fix only this stack
        #[arg(long)]
        stack_name: Option<String>,

        /// Report what would be done without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Delete the stack as a last resort when nothing else succeeded
        #[arg(long)]
        force_delete: bool,

        /// Cancel and delete stacks stuck creating or updating
        #[arg(long)]
        delete_in_progress: bool,

        /// Skip unfixable resources when continuing a rollback
        #[arg(long)]
        skip_unfixable: bool,
    },

    /// Pre-deployment go/no-go check
    Gate {
        /// Remediate stuck stacks and wait for them to stabilize
        #[arg(long)]
        auto_fix: bool,

        /// Skip service checks while a recent rollback recovers
        #[arg(long)]
        skip_ecs_after_rollback: bool,
    },

    /// Report deployment status, once or continuously
    Monitor {
        /// Keep polling until healthy, rollback needed or the duration elapses
        #[arg(long)]
        continuous: bool,

        /// Seconds between polls (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,

        /// Maximum seconds to keep polling (defaults to the configured duration)
        #[arg(long)]
        duration: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            output::print_error(&format!("{err:#}"));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_tracing(verbose: bool, log_format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config_path = cli.config.or_else(config::default_config_path);
    let engine_config = EngineConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;
    debug!(path = ?config_path, "Configuration loaded");

    let backend = Arc::new(AwsCli::new(cli.region, cli.profile));
    let session = Session::new(cli.environment, engine_config, Backends::from_single(backend));
    session
        .preflight()
        .await
        .context("Unable to reach the stack backend")?;

    let format = if cli.json {
        output::OutputFormat::Json
    } else {
        cli.format
    };

    let code = match cli.command {
        Commands::Inspect {
            stack_name,
            treat_in_progress_as_stuck,
        } => inspect::run(&session, stack_name, treat_in_progress_as_stuck, format).await?,
        Commands::Fix {
            stack_name,
            dry_run,
            force_delete,
            delete_in_progress,
            skip_unfixable,
        } => {
            let options = fix::options(stack_name, dry_run, force_delete, delete_in_progress, skip_unfixable);
            fix::run(&session, &options, format).await?
        }
        Commands::Gate {
            auto_fix,
            skip_ecs_after_rollback,
        } => {
            gate::run(
                &session,
                mend_lib::GateOptions {
                    auto_fix,
                    skip_ecs_after_rollback,
                },
                format,
            )
            .await?
        }
        Commands::Monitor {
            continuous,
            interval,
            duration,
        } => monitor::run(&session, continuous, interval, duration, format).await?,
    };

    Ok(code)
}
