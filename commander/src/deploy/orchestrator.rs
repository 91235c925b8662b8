//! Deploy orchestrator
//!
//! Resolves the target servers, then deploys them one at a time. A failing
//! server is recorded and the next one is still attempted.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::deploy::archive::ArchiveBuilder;
use crate::deploy::executor::{RunReport, StepExecutor, StepOutcome};
use crate::deploy::observer::{DeployObserver, SilentObserver};
use crate::deploy::plan::{plan, PlanOptions, Step};
use crate::deploy::recorder::AuditRecorder;
use crate::deploy::selector::{Prompt, ServerSelector};
use crate::errors::DeployError;
use crate::models::{DeployLog, Server, TriggerSource};
use crate::storage::Store;
use crate::transport::TransportProvider;

/// Deploy options
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Resolve and plan only
    pub dry_run: bool,

    /// Skip the per-server confirmation
    pub force: bool,

    /// Do not build or ship plugin files
    pub skip_files: bool,

    pub plugin_codes: Vec<String>,

    pub triggered_by: TriggerSource,

    /// Version label to record on success
    pub release: Option<String>,
}

/// A server and the steps a run would execute
#[derive(Debug, Clone)]
pub struct PlannedServer {
    pub server: Server,
    pub steps: Vec<Step>,
}

/// Result of one server's deployment
#[derive(Debug, Clone)]
pub struct ServerRun {
    pub server: Server,

    /// Audit record, absent when the server was skipped or no log could be opened
    pub log: Option<DeployLog>,

    pub ok: bool,

    /// Declined at the confirmation prompt
    pub skipped: bool,

    pub error: Option<String>,

    pub steps: Vec<StepOutcome>,

    pub version: Option<String>,
}

impl ServerRun {
    fn skipped(server: Server) -> Self {
        Self {
            server,
            log: None,
            ok: false,
            skipped: true,
            error: None,
            steps: Vec::new(),
            version: None,
        }
    }

    fn failed(server: Server, log: Option<DeployLog>, error: String) -> Self {
        Self {
            server,
            log,
            ok: false,
            skipped: false,
            error: Some(error),
            steps: Vec::new(),
            version: None,
        }
    }
}

/// What a deploy call produced
#[derive(Debug, Clone)]
pub enum DeployOutcome {
    DryRun(Vec<PlannedServer>),
    Completed(Vec<ServerRun>),
}

impl DeployOutcome {
    /// True unless an attempted server failed
    pub fn succeeded(&self) -> bool {
        match self {
            DeployOutcome::DryRun(_) => true,
            DeployOutcome::Completed(runs) => runs.iter().all(|r| r.ok || r.skipped),
        }
    }
}

/// Deploy orchestrator
pub struct Orchestrator {
    store: Arc<dyn Store>,
    transports: Arc<dyn TransportProvider>,
    archiver: Arc<dyn ArchiveBuilder>,
    prompt: Arc<dyn Prompt>,
    observer: Arc<dyn DeployObserver>,
    recorder: AuditRecorder,
    staging_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        transports: Arc<dyn TransportProvider>,
        archiver: Arc<dyn ArchiveBuilder>,
        prompt: Arc<dyn Prompt>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            recorder: AuditRecorder::new(store.clone()),
            store,
            transports,
            archiver,
            prompt,
            observer: Arc::new(SilentObserver),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeployObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Resolve the selector against the stored servers
    pub async fn resolve(&self, selector: &ServerSelector) -> Result<Vec<Server>, DeployError> {
        let servers = self.store.list_servers().await?;
        selector.resolve(servers, self.prompt.as_ref())
    }

    /// Deploy every selected server in order
    pub async fn deploy(&self, selector: &ServerSelector, options: &DeployOptions) -> Result<DeployOutcome, DeployError> {
        let servers = self.resolve(selector).await?;

        if options.dry_run {
            info!("Dry run for {} server(s)", servers.len());
            let planned = servers
                .into_iter()
                .map(|server| PlannedServer {
                    steps: plan(&plan_options(&server, options)),
                    server,
                })
                .collect();
            return Ok(DeployOutcome::DryRun(planned));
        }

        let confirm = !options.force && selector.needs_confirmation();
        let mut runs = Vec::with_capacity(servers.len());

        for server in servers {
            let confirmed = if confirm {
                match self.prompt.confirm_deploy(&server) {
                    Ok(answer) => answer,
                    Err(e) => {
                        error!("Unable to confirm {}: {}", server.name, e);
                        let run = ServerRun::failed(server, None, e.to_string());
                        self.observer.server_finished(&run);
                        runs.push(run);
                        continue;
                    }
                }
            } else {
                true
            };

            if !confirmed {
                info!("Skipped {}", server.name);
                let run = ServerRun::skipped(server);
                self.observer.server_finished(&run);
                runs.push(run);
                continue;
            }

            self.observer.server_started(&server);
            let run = self.deploy_server(server, options).await;
            self.observer.server_finished(&run);
            runs.push(run);
        }

        Ok(DeployOutcome::Completed(runs))
    }

    async fn deploy_server(&self, server: Server, options: &DeployOptions) -> ServerRun {
        info!("Deploying {} via {}", server.label(), server.deploy_method.as_str());

        let log = match self.recorder.begin(&server, options.triggered_by).await {
            Ok(log) => log,
            Err(e) => {
                error!("Unable to open deploy log for {}: {}", server.name, e);
                return ServerRun::failed(server, None, e.to_string());
            }
        };

        let report = match self.execute(&server, options).await {
            Ok(report) => report,
            Err(e) => {
                error!("Deployment of {} failed before running: {}", server.name, e);
                let message = e.to_string();
                let log = self.close_failed(&log, "", &message).await;
                return ServerRun::failed(server, Some(log), message);
            }
        };

        let RunReport {
            ok,
            steps,
            output,
            failure,
            version,
        } = report;

        if ok {
            let log = match self.recorder.succeed(&log, output).await {
                Ok(log) => log,
                Err(e) => {
                    error!("Unable to close deploy log {}: {}", log.id, e);
                    return ServerRun {
                        steps,
                        version,
                        ..ServerRun::failed(server, Some(log), e.to_string())
                    };
                }
            };
            return ServerRun {
                server,
                log: Some(log),
                ok: true,
                skipped: false,
                error: None,
                steps,
                version,
            };
        }

        let message = failure
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Deployment failed".to_string());
        let log = self.close_failed(&log, &output, &message).await;
        ServerRun {
            steps,
            ..ServerRun::failed(server, Some(log), message)
        }
    }

    async fn execute(&self, server: &Server, options: &DeployOptions) -> Result<RunReport, DeployError> {
        server.validate()?;
        let transport = self.transports.transport_for(server)?;
        let steps = plan(&plan_options(server, options));

        let executor = StepExecutor::new(
            transport,
            self.archiver.clone(),
            self.store.clone(),
            self.staging_dir.clone(),
        )
        .with_observer(self.observer.clone())
        .with_release(options.release.clone());

        Ok(executor.run(server, &steps).await)
    }

    /// Close the log as failed; the running copy is returned if the store refuses
    async fn close_failed(&self, log: &DeployLog, output: &str, message: &str) -> DeployLog {
        match self.recorder.fail(log, output, message).await {
            Ok(log) => log,
            Err(e) => {
                error!("Unable to close deploy log {}: {}", log.id, e);
                log.clone()
            }
        }
    }
}

fn plan_options(server: &Server, options: &DeployOptions) -> PlanOptions {
    PlanOptions {
        sync_source: server.deploy_method.syncs_source(),
        skip_files: options.skip_files || !server.deploy_method.ships_files(),
        plugin_codes: options.plugin_codes.clone(),
    }
}
