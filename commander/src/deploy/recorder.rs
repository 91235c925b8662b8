//! Deploy log bookkeeping

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::models::{DeployLog, DeployStatus, Server, TriggerSource};
use crate::storage::Store;

/// Opens and closes the audit record of each deployment attempt
pub struct AuditRecorder {
    store: Arc<dyn Store>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert the `running` record before anything is executed
    pub async fn begin(&self, server: &Server, triggered_by: TriggerSource) -> Result<DeployLog, DeployError> {
        let log = self.store.create_log(server.id, triggered_by).await?;
        debug!("Opened deploy log {} for {}", log.id, server.name);
        Ok(log)
    }

    pub async fn succeed(&self, log: &DeployLog, output: String) -> Result<DeployLog, DeployError> {
        self.store.finalize_log(log.id, DeployStatus::Success, output).await
    }

    /// Close the record as failed, appending the error to the transcript
    pub async fn fail(&self, log: &DeployLog, output: &str, message: &str) -> Result<DeployLog, DeployError> {
        warn!("Deploy log {} failed: {}", log.id, message);
        self.store
            .finalize_log(log.id, DeployStatus::Failed, failure_output(output, message))
            .await
    }
}

/// Failed transcript: output followed by `\n\nERROR: <message>`
pub fn failure_output(output: &str, message: &str) -> String {
    format!("{}\n\nERROR: {}", output, message)
}
