//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Deploy commander settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for a persistent log file, none for stderr only
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json_logs: bool,

    /// Root of the local plugin tree bundled for file sync
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// Where archives are staged, defaults to `<home>/staging`
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// SSH transport configuration
    #[serde(default)]
    pub ssh: SshSettings,

    /// Webhook transport configuration
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Beacon transport configuration
    #[serde(default)]
    pub beacon: BeaconSettings,
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("plugins")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_dir: None,
            json_logs: false,
            plugins_dir: default_plugins_dir(),
            staging_dir: None,
            ssh: SshSettings::default(),
            webhook: WebhookSettings::default(),
            beacon: BeaconSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, using defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        file.read_json_or_default().await
    }
}

/// SSH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// ssh client binary
    #[serde(default = "default_ssh_program")]
    pub program: String,

    /// scp client binary
    #[serde(default = "default_scp_program")]
    pub scp_program: String,

    /// sshpass binary used for password authentication
    #[serde(default = "default_sshpass_program")]
    pub sshpass_program: String,

    /// Remote execution timeout in seconds
    #[serde(default = "default_ssh_timeout")]
    pub timeout_secs: u64,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_scp_program() -> String {
    "scp".to_string()
}

fn default_sshpass_program() -> String {
    "sshpass".to_string()
}

fn default_ssh_timeout() -> u64 {
    120
}

impl SshSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: default_ssh_program(),
            scp_program: default_scp_program(),
            sshpass_program: default_sshpass_program(),
            timeout_secs: default_ssh_timeout(),
        }
    }
}

/// Webhook transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    30
}

impl WebhookSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout(),
        }
    }
}

/// Beacon transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconSettings {
    /// Request timeout in seconds
    #[serde(default = "default_beacon_timeout")]
    pub timeout_secs: u64,
}

fn default_beacon_timeout() -> u64 {
    60
}

impl BeaconSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_beacon_timeout(),
        }
    }
}
