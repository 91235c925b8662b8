//! Transports deliver operations to a remote server
//!
//! One implementation per [`DeployMethod`], picked by [`TransportFactory`].

pub mod beacon;
pub mod ssh;
pub mod webhook;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::DeployError;
use crate::models::{DeployMethod, Server};
use crate::storage::settings::Settings;

pub use beacon::BeaconTransport;
pub use ssh::SshTransport;
pub use webhook::WebhookTransport;

/// Local archive path → path the transport stored it at remotely
pub type FileMap = BTreeMap<PathBuf, String>;

/// Well-known script and command names used by deployment plans
pub const CLEAR_CACHE: &str = "clear-cache";
pub const MIGRATE_DATABASE: &str = "migrate-database";

/// An operation executed against one server
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Pull the configured branch (SSH) or trigger the deploy hook (webhook)
    SyncSource,

    /// Run a named maintenance script
    RunScript { name: String, vars: Map<String, Value> },

    /// Run a framework console command
    RunCommand { command: String },

    /// Unpack previously uploaded archives
    ExtractFiles { files: FileMap },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::SyncSource => write!(f, "sync source"),
            Operation::RunScript { name, .. } => write!(f, "script {name}"),
            Operation::RunCommand { command } => write!(f, "command {command}"),
            Operation::ExtractFiles { files } => write!(f, "extract {} file(s)", files.len()),
        }
    }
}

/// Normalized result of an executed operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportOutput {
    pub ok: bool,
    pub output: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl TransportOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
            exit_code: Some(0),
            error: None,
        }
    }

    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: output.into(),
            exit_code: None,
            error: Some(error.into()),
        }
    }

    /// Succeeded and, when an exit code was reported, it was zero
    pub fn succeeded(&self) -> bool {
        self.ok && self.exit_code.map_or(true, |code| code == 0)
    }

    /// Reason to report when the operation did not succeed
    pub fn failure_reason(&self) -> String {
        match (&self.error, self.exit_code) {
            (Some(error), _) => error.clone(),
            (None, Some(code)) if code != 0 => format!("remote exit code {code}"),
            _ => "remote reported a failure".to_string(),
        }
    }
}

/// Result of an upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOutcome {
    /// Where the remote side stored the file, if it said
    pub remote_path: Option<String>,
    pub output: String,
}

/// Remote delivery mechanism
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &'static str;

    /// Execute an operation against the server
    async fn execute(&self, server: &Server, operation: &Operation) -> Result<TransportOutput, DeployError>;

    /// Upload a local file to the server
    async fn upload_file(&self, server: &Server, local_path: &Path) -> Result<UploadOutcome, DeployError>;
}

/// Picks the transport for a server
pub trait TransportProvider: Send + Sync {
    fn transport_for(&self, server: &Server) -> Result<Arc<dyn Transport>, DeployError>;
}

/// Factory dispatching on the server's deploy method
pub struct TransportFactory {
    settings: Settings,
}

impl TransportFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl TransportProvider for TransportFactory {
    fn transport_for(&self, server: &Server) -> Result<Arc<dyn Transport>, DeployError> {
        let transport: Arc<dyn Transport> = match server.deploy_method {
            DeployMethod::Ssh => Arc::new(SshTransport::new(self.settings.ssh.clone())),
            DeployMethod::Webhook => Arc::new(WebhookTransport::new(self.settings.webhook.timeout())?),
            DeployMethod::Beacon => Arc::new(BeaconTransport::new(self.settings.beacon.timeout())?),
        };

        Ok(transport)
    }
}

/// Shell command for a named script or command on SSH servers
pub fn remote_shell_command(server: &Server, name: &str) -> Option<String> {
    if let Some(command) = server.remote_commands.get(name) {
        return Some(command.clone());
    }
    match name {
        CLEAR_CACHE => Some("php artisan cache:clear".to_string()),
        MIGRATE_DATABASE => Some("php artisan october:migrate".to_string()),
        _ => None,
    }
}
