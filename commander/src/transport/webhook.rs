//! Webhook transport
//!
//! Triggers a deploy hook with an HTTP POST. The receiving side performs the
//! deployment itself, so maintenance scripts are acknowledged without a call.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::errors::DeployError;
use crate::models::server::non_empty;
use crate::models::Server;
use crate::transport::{Operation, Transport, TransportOutput, UploadOutcome};

/// Header carrying the shared secret
pub const SECRET_HEADER: &str = "X-Deploy-Secret";

#[derive(Debug, Serialize)]
struct TriggerPayload<'a> {
    server: &'a str,
    branch: &'a str,
}

/// Webhook transport
pub struct WebhookTransport {
    client: Client,
}

impl WebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn trigger(&self, server: &Server) -> Result<TransportOutput, DeployError> {
        let webhook_url = webhook_url(server)?;

        let mut request = self
            .client
            .post(webhook_url.clone())
            .header(header::ACCEPT, "application/json")
            .json(&TriggerPayload {
                server: &server.url,
                branch: server.branch(),
            });

        if let Some(secret) = &server.webhook_secret {
            request = request.header(SECRET_HEADER, secret.expose_secret());
        }

        info!("[{}] POST {}", server.name, webhook_url);
        let response = request
            .send()
            .await
            .map_err(|e| DeployError::transport(format!("Webhook request failed: {}", e), ""))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!("Webhook returned {} for {}", status, server.name);
            return Err(DeployError::transport(
                format!("Webhook returned HTTP {}", status.as_u16()),
                body,
            ));
        }

        debug!("Webhook accepted for {}", server.name);
        Ok(TransportOutput::success(format!(
            "Webhook POST to {}\nHTTP {}\n\n{}",
            webhook_url,
            status.as_u16(),
            body
        )))
    }
}

fn webhook_url(server: &Server) -> Result<url::Url, DeployError> {
    let raw = non_empty(&server.webhook_url)
        .ok_or_else(|| DeployError::ConfigError("Webhook URL is not configured for this server.".to_string()))?;
    url::Url::parse(raw).map_err(|e| DeployError::ConfigError(format!("Invalid webhook URL {}: {}", raw, e)))
}

#[async_trait]
impl Transport for WebhookTransport {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn execute(&self, server: &Server, operation: &Operation) -> Result<TransportOutput, DeployError> {
        webhook_url(server)?;

        match operation {
            Operation::SyncSource => self.trigger(server).await,
            Operation::RunScript { name, .. } => Ok(TransportOutput::success(format!(
                "Script {} is run by the webhook receiver",
                name
            ))),
            Operation::RunCommand { command } => Ok(TransportOutput::success(format!(
                "Command {} is run by the webhook receiver",
                command
            ))),
            Operation::ExtractFiles { .. } => Err(DeployError::ConfigError(
                "Webhook servers cannot extract uploaded files".to_string(),
            )),
        }
    }

    async fn upload_file(&self, server: &Server, local_path: &Path) -> Result<UploadOutcome, DeployError> {
        webhook_url(server)?;
        Err(DeployError::UploadError(format!(
            "Webhook servers cannot receive files ({})",
            local_path.display()
        )))
    }
}
