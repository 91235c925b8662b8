//! `deployctl deploy`

use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use tracing::error;

use crate::commands::prompt::TerminalPrompt;
use crate::commands::{AppContext, EXIT_FAILURE, EXIT_NO_MATCH, EXIT_OK};
use crate::deploy::{
    DeployObserver, DeployOptions, DeployOutcome, Orchestrator, PlannedServer, ServerRun, ServerSelector, Step,
    StepOutcome, StepStatus, ZipArchiveBuilder,
};
use crate::errors::DeployError;
use crate::models::{Server, TriggerSource};
use crate::transport::TransportFactory;

#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    /// Server URL to deploy, trailing slash ignored
    pub url: Option<String>,

    /// Deploy servers whose name contains this text
    #[arg(long)]
    pub name: Option<String>,

    /// Deploy one server by id
    #[arg(long)]
    pub id: Option<u64>,

    /// Deploy every active server without confirmation
    #[arg(long)]
    pub all: bool,

    /// Show what would be deployed without deploying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,

    /// Plugin codes to ship, e.g. Acme.Blog,Acme.Shop
    #[arg(long, value_delimiter = ',')]
    pub plugins: Vec<String>,

    /// Do not build or upload plugin files
    #[arg(long)]
    pub no_files: bool,

    /// Version label recorded on success
    #[arg(long)]
    pub release: Option<String>,

    /// Who started the deployment
    #[arg(long, value_enum, default_value_t = TriggerSource::Cli)]
    pub triggered_by: TriggerSource,
}

impl DeployArgs {
    pub fn selector(&self) -> ServerSelector {
        ServerSelector::from_args(self.url.clone(), self.name.clone(), self.id, self.all)
    }

    pub fn options(&self) -> DeployOptions {
        DeployOptions {
            dry_run: self.dry_run,
            force: self.force,
            skip_files: self.no_files,
            plugin_codes: self.plugins.clone(),
            triggered_by: self.triggered_by,
            release: self.release.clone(),
        }
    }
}

/// Prints deployment progress to stdout
pub struct ConsoleObserver;

impl DeployObserver for ConsoleObserver {
    fn server_started(&self, server: &Server) {
        println!();
        println!(
            "{}",
            format!("Deploying [{}] → {}", server.name, server.url).cyan().bold()
        );
    }

    fn step_started(&self, _server: &Server, step: &Step) {
        println!("  → Running: {}", step);
    }

    fn step_finished(&self, _server: &Server, outcome: &StepOutcome) {
        if outcome.status == StepStatus::Failed {
            println!("    {} {}", "✗".red(), outcome.step.kind().red());
        }
    }

    fn server_finished(&self, run: &ServerRun) {
        if run.skipped {
            println!("Skipped {}.", run.server.name);
        } else if run.ok {
            let version = run.version.as_deref().unwrap_or("-");
            println!(
                "{}",
                format!("Deployed successfully [{}] ({})", run.server.name, version).green()
            );
        } else {
            println!(
                "{}",
                format!(
                    "Deployment FAILED for [{}]: {}",
                    run.server.name,
                    run.error.as_deref().unwrap_or("unknown error")
                )
                .red()
            );
        }
    }
}

pub fn render_dry_run(planned: &[PlannedServer]) -> String {
    let mut out = format!("{}\n", "[DRY RUN] The following servers would be deployed:".yellow());
    for entry in planned {
        out.push_str(&format!(
            "  » {} via {}\n",
            entry.server.label(),
            entry.server.deploy_method.as_str()
        ));
        for step in &entry.steps {
            out.push_str(&format!("      {}\n", step));
        }
    }
    out
}

pub fn render_summary(runs: &[ServerRun]) -> String {
    let succeeded = runs.iter().filter(|r| r.ok).count();
    let failed = runs.iter().filter(|r| !r.ok && !r.skipped).count();
    let skipped = runs.iter().filter(|r| r.skipped).count();

    let mut line = format!("{} succeeded, {} failed", succeeded, failed);
    if skipped > 0 {
        line.push_str(&format!(", {} skipped", skipped));
    }
    if failed > 0 {
        line.red().to_string()
    } else {
        line.green().to_string()
    }
}

pub async fn run(ctx: &AppContext, args: &DeployArgs) -> anyhow::Result<u8> {
    let orchestrator = Orchestrator::new(
        ctx.store.clone(),
        Arc::new(TransportFactory::new(ctx.settings.clone())),
        Arc::new(ZipArchiveBuilder::new(ctx.settings.plugins_dir.clone())),
        Arc::new(TerminalPrompt::new()),
        ctx.staging_dir(),
    )
    .with_observer(Arc::new(ConsoleObserver));

    let outcome = match orchestrator.deploy(&args.selector(), &args.options()).await {
        Ok(outcome) => outcome,
        Err(DeployError::NoMatchingServer) => {
            eprintln!("{}", "No matching server found.".red());
            eprintln!("Use {} to see available servers.", "deployctl list".cyan());
            return Ok(EXIT_NO_MATCH);
        }
        Err(e) => {
            error!("Deployment aborted: {}", e);
            return Err(e.into());
        }
    };

    match &outcome {
        DeployOutcome::DryRun(planned) => print!("{}", render_dry_run(planned)),
        DeployOutcome::Completed(runs) => {
            println!();
            println!("{}", render_summary(runs));
        }
    }

    Ok(if outcome.succeeded() { EXIT_OK } else { EXIT_FAILURE })
}
