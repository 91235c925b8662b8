//! Persistence seam for servers and deploy logs
//!
//! Server records are owned by whoever administers them; the engine only
//! reads them and touches the last deploy fields after a successful run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DeployError;
use crate::models::{DeployLog, DeployStatus, Server, TriggerSource};

#[async_trait]
pub trait Store: Send + Sync {
    /// All servers ordered by id
    async fn list_servers(&self) -> Result<Vec<Server>, DeployError>;

    /// Record a successful deployment on the server row
    async fn touch_server(
        &self,
        id: u64,
        deployed_at: DateTime<Utc>,
        version: &str,
    ) -> Result<(), DeployError>;

    /// Remove a server; its logs are kept with a null server reference
    async fn remove_server(&self, id: u64) -> Result<bool, DeployError>;

    /// Insert a `running` log with empty output
    async fn create_log(
        &self,
        server_id: u64,
        triggered_by: TriggerSource,
    ) -> Result<DeployLog, DeployError>;

    /// Apply the single terminal transition of a log
    async fn finalize_log(
        &self,
        id: u64,
        status: DeployStatus,
        output: String,
    ) -> Result<DeployLog, DeployError>;

    /// Logs newest first, optionally for one server
    async fn list_logs(
        &self,
        server_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<DeployLog>, DeployError>;
}

/// Apply a touch to the matching server in a list
pub(crate) fn touch_in(
    servers: &mut [Server],
    id: u64,
    deployed_at: DateTime<Utc>,
    version: &str,
) -> Result<(), DeployError> {
    let server = servers
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| DeployError::NotFound(format!("server {id}")))?;
    server.last_deploy_at = Some(deployed_at);
    server.last_version = Some(version.to_string());
    Ok(())
}

/// Remove a server from a list and null the references of its logs
pub(crate) fn remove_in(servers: &mut Vec<Server>, logs: &mut [DeployLog], id: u64) -> bool {
    let before = servers.len();
    servers.retain(|s| s.id != id);
    if servers.len() == before {
        return false;
    }
    for log in logs.iter_mut().filter(|l| l.server_id == Some(id)) {
        log.server_id = None;
    }
    true
}

/// Append a fresh running log with the next id
pub(crate) fn create_in(logs: &mut Vec<DeployLog>, server_id: u64, triggered_by: TriggerSource) -> DeployLog {
    let id = logs.iter().map(|l| l.id).max().unwrap_or(0) + 1;
    let log = DeployLog::running(id, server_id, triggered_by);
    logs.push(log.clone());
    log
}

/// Finish the log with the given id in place
pub(crate) fn finalize_in(
    logs: &mut [DeployLog],
    id: u64,
    status: DeployStatus,
    output: String,
) -> Result<DeployLog, DeployError> {
    let log = logs
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or_else(|| DeployError::NotFound(format!("deploy log {id}")))?;
    log.finish(status, output)?;
    Ok(log.clone())
}

/// Newest first, filtered and limited
pub(crate) fn select_logs(logs: &[DeployLog], server_id: Option<u64>, limit: usize) -> Vec<DeployLog> {
    let mut selected: Vec<DeployLog> = logs
        .iter()
        .filter(|l| server_id.is_none() || l.server_id == server_id)
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.id.cmp(&a.id));
    selected.truncate(limit);
    selected
}
