//! Step executor
//!
//! Runs a plan against one server through its transport. The first failing
//! step aborts the run; `finalize` still runs exactly once afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Map;
use tempfile::TempPath;
use tracing::{debug, error, info, warn};

use crate::deploy::archive::ArchiveBuilder;
use crate::deploy::fsm::{RunEvent, RunFsm, RunState};
use crate::deploy::observer::{DeployObserver, SilentObserver};
use crate::deploy::plan::Step;
use crate::errors::DeployError;
use crate::models::Server;
use crate::storage::Store;
use crate::transport::{FileMap, Operation, Transport, TransportOutput};
use crate::utils::release_label;

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
    pub output: String,
}

impl StepOutcome {
    fn skipped(step: &Step) -> Self {
        Self {
            step: step.clone(),
            status: StepStatus::Skipped,
            output: String::new(),
        }
    }
}

/// Result of a whole run
#[derive(Debug)]
pub struct RunReport {
    pub ok: bool,
    pub steps: Vec<StepOutcome>,

    /// Transcript of every executed step
    pub output: String,

    /// First error that failed the run
    pub failure: Option<DeployError>,

    /// Version recorded on the server after a successful run
    pub version: Option<String>,
}

/// Temp files staged for one run, removed when released or dropped
#[derive(Default)]
struct StagedFiles {
    paths: Vec<TempPath>,
}

impl StagedFiles {
    fn stage(&mut self, dir: &Path) -> Result<PathBuf, DeployError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            DeployError::LocalBuildError(format!("Unable to create {}: {}", dir.display(), e))
        })?;
        let file = tempfile::Builder::new()
            .prefix("bundle-")
            .suffix(".zip")
            .tempfile_in(dir)
            .map_err(|e| {
                DeployError::LocalBuildError(format!("Unable to stage archive in {}: {}", dir.display(), e))
            })?;

        let path = file.into_temp_path();
        let local = path.to_path_buf();
        self.paths.push(path);
        Ok(local)
    }

    /// Delete every staged file; failures are logged and ignored
    fn release(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => removed += 1,
                Err(e) => warn!("Unable to remove staged file {}: {}", shown, e),
            }
        }
        removed
    }
}

/// Per-run state threaded between steps
#[derive(Default)]
struct RunContext {
    staged: StagedFiles,
    archive: Option<PathBuf>,
    files: FileMap,
    transcript: String,
}

impl RunContext {
    fn record(&mut self, step: &Step, output: &str, error: Option<&DeployError>) {
        self.transcript.push_str(&format!("==> {}\n", step));
        if !output.trim().is_empty() {
            self.transcript.push_str(output.trim_end());
            self.transcript.push('\n');
        }
        if let Some(e) = error {
            self.transcript.push_str(&format!("!! {}\n", e));
        }
    }
}

/// Executes plans for one server
pub struct StepExecutor {
    transport: Arc<dyn Transport>,
    archiver: Arc<dyn ArchiveBuilder>,
    store: Arc<dyn Store>,
    observer: Arc<dyn DeployObserver>,
    staging_dir: PathBuf,
    release: Option<String>,
}

impl StepExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        archiver: Arc<dyn ArchiveBuilder>,
        store: Arc<dyn Store>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            archiver,
            store,
            observer: Arc::new(SilentObserver),
            staging_dir: staging_dir.into(),
            release: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeployObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Version label to record instead of a timestamp
    pub fn with_release(mut self, release: Option<String>) -> Self {
        self.release = release.filter(|r| !r.trim().is_empty());
        self
    }

    fn advance(fsm: &mut RunFsm, event: RunEvent) {
        if let Err(e) = fsm.process(event) {
            error!("{}", e);
        }
    }

    /// Run `steps` in order against `server`
    pub async fn run(&self, server: &Server, steps: &[Step]) -> RunReport {
        info!(
            "[{}] Running {} step(s) via {}",
            server.name,
            steps.len(),
            self.transport.name()
        );

        let mut fsm = RunFsm::new();
        let mut ctx = RunContext::default();
        let mut outcomes = Vec::with_capacity(steps.len());
        let mut failure: Option<DeployError> = None;

        Self::advance(&mut fsm, RunEvent::Begin);

        for step in steps.iter().filter(|s| **s != Step::Finalize) {
            if fsm.is_aborted() {
                debug!("[{}] Skipping {}", server.name, step);
                outcomes.push(StepOutcome::skipped(step));
                continue;
            }

            self.observer.step_started(server, step);
            let (output, result) = self.execute_step(server, step, &mut ctx).await;
            ctx.record(step, &output, result.as_ref().err());

            let outcome = match result {
                Ok(()) => {
                    Self::advance(&mut fsm, RunEvent::StepSucceeded);
                    StepOutcome {
                        step: step.clone(),
                        status: StepStatus::Succeeded,
                        output,
                    }
                }
                Err(e) => {
                    error!("[{}] {} failed: {}", server.name, step, e);
                    Self::advance(&mut fsm, RunEvent::StepFailed(e.to_string()));
                    failure = Some(e);
                    StepOutcome {
                        step: step.clone(),
                        status: StepStatus::Failed,
                        output,
                    }
                }
            };

            self.observer.step_finished(server, &outcome);
            outcomes.push(outcome);
        }

        Self::advance(&mut fsm, RunEvent::Finalize);
        let finalize = Step::Finalize;
        self.observer.step_started(server, &finalize);

        let mut lines = Vec::new();
        let removed = ctx.staged.release();
        if removed > 0 {
            lines.push(format!("Removed {} staged file(s)", removed));
        }

        let mut version = None;
        let mut finalize_error = None;
        if matches!(fsm.state(), RunState::Finalizing { success: true }) {
            let now = Utc::now();
            let label = self.release.clone().unwrap_or_else(|| release_label(now));
            match self.store.touch_server(server.id, now, &label).await {
                Ok(()) => {
                    lines.push(format!("Recorded version {}", label));
                    version = Some(label);
                }
                Err(e) => {
                    error!("[{}] Unable to record deployment: {}", server.name, e);
                    Self::advance(&mut fsm, RunEvent::StepFailed(e.to_string()));
                    finalize_error = Some(e);
                }
            }
        }

        let output = lines.join("\n");
        ctx.record(&finalize, &output, finalize_error.as_ref());
        let outcome = StepOutcome {
            step: finalize,
            status: if finalize_error.is_some() {
                StepStatus::Failed
            } else {
                StepStatus::Succeeded
            },
            output,
        };
        self.observer.step_finished(server, &outcome);
        outcomes.push(outcome);

        if failure.is_none() {
            failure = finalize_error;
        }

        Self::advance(&mut fsm, RunEvent::Finished);
        let ok = fsm.state() == &RunState::Succeeded;
        if ok {
            info!("[{}] Deployment succeeded", server.name);
        }

        RunReport {
            ok,
            steps: outcomes,
            output: ctx.transcript,
            failure,
            version,
        }
    }

    async fn execute_step(
        &self,
        server: &Server,
        step: &Step,
        ctx: &mut RunContext,
    ) -> (String, Result<(), DeployError>) {
        match step {
            Step::SyncSource => {
                let result = self.transport.execute(server, &Operation::SyncSource).await;
                operation_result(step, result)
            }
            Step::BuildArchive { codes } => match self.build_archive(codes, ctx).await {
                Ok(path) => (format!("Bundled {} into {}", codes.join(", "), path.display()), Ok(())),
                Err(e) => (String::new(), Err(e)),
            },
            Step::UploadFile => match self.upload(server, ctx).await {
                Ok(output) => (output, Ok(())),
                Err(e) => (String::new(), Err(e)),
            },
            Step::ExtractFiles => {
                let operation = Operation::ExtractFiles {
                    files: ctx.files.clone(),
                };
                let result = self.transport.execute(server, &operation).await;
                operation_result(step, result)
            }
            Step::RunRemoteScript { name } => {
                let operation = Operation::RunScript {
                    name: name.clone(),
                    vars: Map::new(),
                };
                let result = self.transport.execute(server, &operation).await;
                operation_result(step, result)
            }
            Step::RunRemoteCommand { command } => {
                let operation = Operation::RunCommand {
                    command: command.clone(),
                };
                let result = self.transport.execute(server, &operation).await;
                operation_result(step, result)
            }
            Step::Finalize => (String::new(), Ok(())),
        }
    }

    async fn build_archive(&self, codes: &[String], ctx: &mut RunContext) -> Result<PathBuf, DeployError> {
        let local = ctx.staged.stage(&self.staging_dir)?;

        let archiver = self.archiver.clone();
        let codes = codes.to_vec();
        let path = local.clone();
        tokio::task::spawn_blocking(move || archiver.build_bundle(&path, &codes))
            .await
            .map_err(|e| DeployError::LocalBuildError(format!("Archive task failed: {}", e)))??;

        ctx.archive = Some(local.clone());
        Ok(local)
    }

    async fn upload(&self, server: &Server, ctx: &mut RunContext) -> Result<String, DeployError> {
        let local = ctx
            .archive
            .clone()
            .ok_or_else(|| DeployError::UploadError("No archive was staged for upload".to_string()))?;

        let uploaded = self.transport.upload_file(server, &local).await?;
        let remote = uploaded.remote_path.ok_or_else(|| {
            DeployError::UploadError(format!("Remote side reported no path for {}", local.display()))
        })?;

        ctx.files.insert(local, remote);
        Ok(uploaded.output)
    }
}

/// Fold a transport result into step output plus error
fn operation_result(
    step: &Step,
    result: Result<TransportOutput, DeployError>,
) -> (String, Result<(), DeployError>) {
    match result {
        Ok(out) if out.succeeded() => (out.output, Ok(())),
        Ok(out) => {
            let reason = out.failure_reason();
            (
                out.output,
                Err(DeployError::RemoteExecutionError(format!("{} failed: {}", step, reason))),
            )
        }
        Err(e) => {
            let output = match &e {
                DeployError::TransportError { output, .. } => output.clone(),
                _ => String::new(),
            };
            (output, Err(e))
        }
    }
}
