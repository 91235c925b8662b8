//! Beacon transport
//!
//! Speaks the beacon agent's request/response contract over HTTP POST.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use beacon_protocol::{ArtisanResponse, BeaconRequest, FileResponse, ScriptResponse};
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::server::non_empty;
use crate::models::Server;
use crate::transport::{Operation, Transport, TransportOutput, UploadOutcome, CLEAR_CACHE, MIGRATE_DATABASE};

/// Header carrying the beacon key
pub const KEY_HEADER: &str = "X-Beacon-Key";

/// Script the beacon runs to unpack uploaded archives
pub const EXTRACT_SCRIPT: &str = "extract_archive";

/// Beacon transport
pub struct BeaconTransport {
    client: Client,
}

impl BeaconTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn call<R: DeserializeOwned>(&self, server: &Server, request: &BeaconRequest) -> Result<R, DeployError> {
        let url = beacon_url(server)?;
        debug!("[{}] {} -> {}", server.name, request.command_name(), url);

        let mut builder = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(request);
        if let Some(key) = &server.beacon_key {
            builder = builder.header(KEY_HEADER, key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            DeployError::transport(format!("Beacon {} failed: {}", request.command_name(), e), "")
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DeployError::transport(
                format!("Beacon returned HTTP {} for {}", status.as_u16(), request.command_name()),
                body,
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            DeployError::transport(
                format!("Unreadable {} response from beacon: {}", request.command_name(), e),
                body,
            )
        })
    }

    async fn transmit_script(
        &self,
        server: &Server,
        name: &str,
        vars: Map<String, Value>,
    ) -> Result<TransportOutput, DeployError> {
        let response: ScriptResponse = self.call(server, &BeaconRequest::script(name, vars)).await?;
        if response.is_ok() {
            Ok(TransportOutput::success(format!("Script {}: ok", name)))
        } else {
            let reason = response
                .error
                .unwrap_or_else(|| format!("script {} reported status {}", name, response.status));
            Ok(TransportOutput::failure(format!("Script {}: {}", name, response.status), reason))
        }
    }

    async fn transmit_artisan(&self, server: &Server, command: &str) -> Result<TransportOutput, DeployError> {
        let response: ArtisanResponse = self.call(server, &BeaconRequest::artisan(command)).await?;
        let output = response.decode_output()?;
        Ok(TransportOutput {
            ok: response.is_ok(),
            output,
            exit_code: i32::try_from(response.err_code).ok().or(Some(i32::MAX)),
            error: (!response.is_ok()).then(|| format!("{} exited with code {}", command, response.err_code)),
        })
    }
}

fn beacon_url(server: &Server) -> Result<url::Url, DeployError> {
    let raw = non_empty(&server.beacon_url)
        .ok_or_else(|| DeployError::ConfigError("Beacon URL is not configured for this server.".to_string()))?;
    url::Url::parse(raw).map_err(|e| DeployError::ConfigError(format!("Invalid beacon URL {}: {}", raw, e)))
}

/// Beacon script name for a plan script (`clear-cache` → `clear_cache`)
pub fn script_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Console command for a plan command
pub fn artisan_command(server: &Server, command: &str) -> String {
    if let Some(mapped) = server.remote_commands.get(command) {
        return mapped.clone();
    }
    match command {
        MIGRATE_DATABASE => "october:migrate".to_string(),
        CLEAR_CACHE => "cache:clear".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Transport for BeaconTransport {
    fn name(&self) -> &'static str {
        "beacon"
    }

    async fn execute(&self, server: &Server, operation: &Operation) -> Result<TransportOutput, DeployError> {
        beacon_url(server)?;

        match operation {
            Operation::SyncSource => Err(DeployError::ConfigError(
                "Beacon servers do not support source sync".to_string(),
            )),
            Operation::RunScript { name, vars } => {
                info!("[{}] transmitScript {}", server.name, name);
                self.transmit_script(server, &script_name(name), vars.clone()).await
            }
            Operation::RunCommand { command } => {
                let artisan = artisan_command(server, command);
                info!("[{}] transmitArtisan {}", server.name, artisan);
                self.transmit_artisan(server, &artisan).await
            }
            Operation::ExtractFiles { files } => {
                let mapping: Map<String, Value> = files
                    .iter()
                    .map(|(local, remote)| {
                        let name = local
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        (remote.clone(), Value::String(name))
                    })
                    .collect();

                let mut vars = Map::new();
                vars.insert("files".to_string(), Value::Object(mapping));
                info!("[{}] transmitScript {} ({} file(s))", server.name, EXTRACT_SCRIPT, files.len());
                self.transmit_script(server, EXTRACT_SCRIPT, vars).await
            }
        }
    }

    async fn upload_file(&self, server: &Server, local_path: &Path) -> Result<UploadOutcome, DeployError> {
        beacon_url(server)?;

        let bytes = File::new(local_path).read_bytes().await?;
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DeployError::UploadError(format!("Invalid upload path: {}", local_path.display())))?;

        info!("[{}] transmitFile {} ({} bytes)", server.name, filename, bytes.len());
        let response: FileResponse = self.call(server, &BeaconRequest::file(&filename, &bytes)).await?;
        let remote_path = response.decode_path()?;

        Ok(UploadOutcome {
            output: match &remote_path {
                Some(path) => format!("Uploaded {} to {}", filename, path),
                None => format!("Uploaded {} but the beacon reported no path", filename),
            },
            remote_path,
        })
    }
}
