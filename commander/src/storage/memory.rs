//! In-memory store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::DeployError;
use crate::models::{DeployLog, DeployStatus, Server, TriggerSource};
use crate::storage::store::{create_in, finalize_in, remove_in, select_logs, touch_in, Store};

#[derive(Debug, Default)]
struct Tables {
    servers: Vec<Server>,
    logs: Vec<DeployLog>,
}

/// Store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(mut servers: Vec<Server>) -> Self {
        servers.sort_by_key(|s| s.id);
        Self {
            tables: Arc::new(RwLock::new(Tables {
                servers,
                logs: Vec::new(),
            })),
        }
    }

    pub async fn server(&self, id: u64) -> Option<Server> {
        self.tables.read().await.servers.iter().find(|s| s.id == id).cloned()
    }

    pub async fn log_count(&self) -> usize {
        self.tables.read().await.logs.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_servers(&self) -> Result<Vec<Server>, DeployError> {
        Ok(self.tables.read().await.servers.clone())
    }

    async fn touch_server(
        &self,
        id: u64,
        deployed_at: DateTime<Utc>,
        version: &str,
    ) -> Result<(), DeployError> {
        let mut tables = self.tables.write().await;
        touch_in(&mut tables.servers, id, deployed_at, version)
    }

    async fn remove_server(&self, id: u64) -> Result<bool, DeployError> {
        let mut tables = self.tables.write().await;
        let Tables { servers, logs } = &mut *tables;
        Ok(remove_in(servers, logs, id))
    }

    async fn create_log(
        &self,
        server_id: u64,
        triggered_by: TriggerSource,
    ) -> Result<DeployLog, DeployError> {
        let mut tables = self.tables.write().await;
        Ok(create_in(&mut tables.logs, server_id, triggered_by))
    }

    async fn finalize_log(
        &self,
        id: u64,
        status: DeployStatus,
        output: String,
    ) -> Result<DeployLog, DeployError> {
        let mut tables = self.tables.write().await;
        finalize_in(&mut tables.logs, id, status, output)
    }

    async fn list_logs(
        &self,
        server_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<DeployLog>, DeployError> {
        Ok(select_logs(&self.tables.read().await.logs, server_id, limit))
    }
}
