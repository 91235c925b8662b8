//! JSON file store under the storage layout

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::{DeployLog, DeployStatus, Server, TriggerSource};
use crate::storage::layout::StorageLayout;
use crate::storage::store::{create_in, finalize_in, remove_in, select_logs, touch_in, Store};

/// Store backed by `servers.json` and `deploy_logs.json`
#[derive(Debug)]
pub struct JsonStore {
    servers_file: File,
    logs_file: File,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(layout: &StorageLayout) -> Self {
        Self {
            servers_file: layout.servers_file(),
            logs_file: layout.deploy_logs_file(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_servers(&self) -> Result<Vec<Server>, DeployError> {
        let mut servers: Vec<Server> = self.servers_file.read_json_or_default().await.map_err(|e| {
            DeployError::StorageError(format!(
                "Unable to read {}: {}",
                self.servers_file.path().display(),
                e
            ))
        })?;
        servers.sort_by_key(|s| s.id);
        Ok(servers)
    }

    async fn write_servers(&self, servers: &[Server]) -> Result<(), DeployError> {
        self.servers_file.write_json(&servers).await?;
        // credentials live in this file
        self.servers_file.set_permissions_600().await
    }

    async fn read_logs(&self) -> Result<Vec<DeployLog>, DeployError> {
        self.logs_file.read_json_or_default().await.map_err(|e| {
            DeployError::StorageError(format!(
                "Unable to read {}: {}",
                self.logs_file.path().display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn list_servers(&self) -> Result<Vec<Server>, DeployError> {
        self.read_servers().await
    }

    async fn touch_server(
        &self,
        id: u64,
        deployed_at: DateTime<Utc>,
        version: &str,
    ) -> Result<(), DeployError> {
        let _guard = self.write_lock.lock().await;
        let mut servers = self.read_servers().await?;
        touch_in(&mut servers, id, deployed_at, version)?;
        self.write_servers(&servers).await?;
        debug!("Touched server {} with version {}", id, version);
        Ok(())
    }

    async fn remove_server(&self, id: u64) -> Result<bool, DeployError> {
        let _guard = self.write_lock.lock().await;
        let mut servers = self.read_servers().await?;
        let mut logs = self.read_logs().await?;
        if !remove_in(&mut servers, &mut logs, id) {
            return Ok(false);
        }
        self.logs_file.write_json(&logs).await?;
        self.write_servers(&servers).await?;
        Ok(true)
    }

    async fn create_log(
        &self,
        server_id: u64,
        triggered_by: TriggerSource,
    ) -> Result<DeployLog, DeployError> {
        let _guard = self.write_lock.lock().await;
        let mut logs = self.read_logs().await?;
        let log = create_in(&mut logs, server_id, triggered_by);
        self.logs_file.write_json(&logs).await?;
        Ok(log)
    }

    async fn finalize_log(
        &self,
        id: u64,
        status: DeployStatus,
        output: String,
    ) -> Result<DeployLog, DeployError> {
        let _guard = self.write_lock.lock().await;
        let mut logs = self.read_logs().await?;
        let log = finalize_in(&mut logs, id, status, output)?;
        self.logs_file.write_json(&logs).await?;
        Ok(log)
    }

    async fn list_logs(
        &self,
        server_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<DeployLog>, DeployError> {
        Ok(select_logs(&self.read_logs().await?, server_id, limit))
    }
}
