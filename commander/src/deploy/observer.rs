//! Progress callbacks for deployments

use crate::deploy::executor::StepOutcome;
use crate::deploy::orchestrator::ServerRun;
use crate::deploy::plan::Step;
use crate::models::Server;

/// Receives progress while servers are deployed
pub trait DeployObserver: Send + Sync {
    fn server_started(&self, _server: &Server) {}

    fn step_started(&self, _server: &Server, _step: &Step) {}

    fn step_finished(&self, _server: &Server, _outcome: &StepOutcome) {}

    fn server_finished(&self, _run: &ServerRun) {}
}

/// Observer that ignores every event
pub struct SilentObserver;

impl DeployObserver for SilentObserver {}
