//! deployctl - Entry Point
//!
//! Usage: deployctl <COMMAND>
//!
//! Commands:
//!   list     List configured servers and their last deployment
//!   deploy   Deploy one or more servers
//!   logs     Show the deployment audit log
//!   version  Print version information

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use deploy_commander::commands::deploy::DeployArgs;
use deploy_commander::commands::list::ListArgs;
use deploy_commander::commands::logs::LogsArgs;
use deploy_commander::commands::{self, AppContext, EXIT_FAILURE, EXIT_OK};
use deploy_commander::logs::{init_logging, LogLevel, LogOptions};
use deploy_commander::utils::version_info;

/// Deploy Commander - fleet deployments with an audit trail
#[derive(Parser, Debug)]
#[command(name = "deployctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding settings, servers and deploy logs
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List servers with their last deployment
    #[command(alias = "list-servers")]
    List(ListArgs),

    /// Deploy one or more servers
    Deploy(DeployArgs),

    /// Show deployment logs, newest first
    Logs(LogsArgs),

    /// Print version information as JSON
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    if let Commands::Version = cli.command {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(EXIT_OK);
    }

    let ctx = AppContext::load(cli.home)
        .await
        .context("Unable to load settings")?;

    let _guard = init_logging(LogOptions {
        log_level: cli.log_level.unwrap_or(ctx.settings.log_level),
        log_dir: ctx.settings.log_dir.clone(),
        json_format: ctx.settings.json_logs,
    })
    .context("Unable to initialize logging")?;

    debug!("Using settings {:?}", ctx.settings);

    match cli.command {
        Commands::List(args) => {
            commands::list::run(&ctx, &args).await?;
            Ok(EXIT_OK)
        }
        Commands::Deploy(args) => commands::deploy::run(&ctx, &args).await,
        Commands::Logs(args) => {
            commands::logs::run(&ctx, &args).await?;
            Ok(EXIT_OK)
        }
        Commands::Version => Ok(EXIT_OK),
    }
}
