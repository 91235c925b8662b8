//! Deployment audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Deployment log status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeployStatus::Running)
    }
}

/// Where a deployment was started from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    #[default]
    Cli,
    Backend,
    Webhook,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Backend => "backend",
            TriggerSource::Webhook => "webhook",
        }
    }
}

/// Audit record of one deployment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployLog {
    pub id: u64,

    /// Null once the server has been removed
    pub server_id: Option<u64>,

    pub status: DeployStatus,

    #[serde(default)]
    pub output: String,

    pub triggered_by: TriggerSource,

    pub deployed_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl DeployLog {
    /// A fresh `running` record with empty output
    pub fn running(id: u64, server_id: u64, triggered_by: TriggerSource) -> Self {
        let now = Utc::now();
        Self {
            id,
            server_id: Some(server_id),
            status: DeployStatus::Running,
            output: String::new(),
            triggered_by,
            deployed_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the record to its terminal status, exactly once
    pub fn finish(&mut self, status: DeployStatus, output: String) -> Result<(), DeployError> {
        if self.status.is_terminal() {
            return Err(DeployError::InvalidTransition(format!(
                "deploy log {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        if !status.is_terminal() {
            return Err(DeployError::InvalidTransition(format!(
                "deploy log {} cannot be finished as running",
                self.id
            )));
        }

        self.status = status;
        self.output = output;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Status badge shown next to a server: the last log's status or `never`
pub fn status_badge(last_log: Option<&DeployLog>) -> &'static str {
    last_log.map(|log| log.status.as_str()).unwrap_or("never")
}
