//! Server models

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Delivery mechanism configured for a server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMethod {
    /// HTTP POST to a deploy hook
    #[default]
    Webhook,

    /// SSH into the server and run git pull plus hooks
    Ssh,

    /// Remote beacon agent
    Beacon,
}

impl DeployMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMethod::Webhook => "webhook",
            DeployMethod::Ssh => "ssh",
            DeployMethod::Beacon => "beacon",
        }
    }

    /// Whether the method pulls source on the remote side before maintenance runs
    pub fn syncs_source(&self) -> bool {
        matches!(self, DeployMethod::Webhook | DeployMethod::Ssh)
    }

    /// Whether the method can receive and unpack a plugin bundle
    pub fn ships_files(&self) -> bool {
        matches!(self, DeployMethod::Ssh | DeployMethod::Beacon)
    }
}

/// SSH authentication method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshAuthMethod {
    #[default]
    Key,
    Password,
}

/// Server status code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Active,
    Ready,
    Legacy,
    Unreachable,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Active => "active",
            ServerStatus::Ready => "ready",
            ServerStatus::Legacy => "legacy",
            ServerStatus::Unreachable => "unreachable",
        }
    }
}

/// A deployment target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,

    pub name: String,

    /// Canonical public URL of the site
    pub url: String,

    #[serde(default)]
    pub deploy_method: DeployMethod,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default, with = "secret")]
    pub webhook_secret: Option<SecretString>,

    #[serde(default)]
    pub ssh_host: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default)]
    pub ssh_user: Option<String>,

    #[serde(default)]
    pub ssh_auth_method: SshAuthMethod,

    #[serde(default, with = "secret")]
    pub ssh_password: Option<SecretString>,

    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,

    #[serde(default)]
    pub deploy_path: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub beacon_url: Option<String>,

    #[serde(default, with = "secret")]
    pub beacon_key: Option<SecretString>,

    /// Newline separated commands run before the git pull
    #[serde(default)]
    pub before_hooks: Option<String>,

    /// Newline separated commands run after the git pull
    #[serde(default)]
    pub after_hooks: Option<String>,

    /// Shell commands overriding the built-in script and command mapping
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remote_commands: BTreeMap<String, String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub status: ServerStatus,

    #[serde(default)]
    pub last_deploy_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_version: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

impl Server {
    /// Create a server with the given identity and defaults everywhere else
    pub fn new(id: u64, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            deploy_method: DeployMethod::default(),
            webhook_url: None,
            webhook_secret: None,
            ssh_host: None,
            ssh_port: default_ssh_port(),
            ssh_user: None,
            ssh_auth_method: SshAuthMethod::default(),
            ssh_password: None,
            ssh_key_path: None,
            deploy_path: None,
            branch: None,
            beacon_url: None,
            beacon_key: None,
            before_hooks: None,
            after_hooks: None,
            remote_commands: BTreeMap::new(),
            is_active: true,
            status: ServerStatus::default(),
            last_deploy_at: None,
            last_version: None,
        }
    }

    /// Branch to deploy, `main` unless configured
    pub fn branch(&self) -> &str {
        non_empty(&self.branch).unwrap_or("main")
    }

    /// Active servers in `active` or `ready` status can be targeted
    pub fn is_deployable(&self) -> bool {
        self.is_active && matches!(self.status, ServerStatus::Active | ServerStatus::Ready)
    }

    /// Check the fields the configured deploy method requires
    pub fn validate(&self) -> Result<(), DeployError> {
        match self.deploy_method {
            DeployMethod::Ssh => {
                if non_empty(&self.ssh_host).is_none()
                    || non_empty(&self.ssh_user).is_none()
                    || non_empty(&self.deploy_path).is_none()
                {
                    return Err(DeployError::ConfigError(
                        "SSH host, user and deploy path must be configured.".to_string(),
                    ));
                }
            }
            DeployMethod::Webhook => {
                if non_empty(&self.webhook_url).is_none() {
                    return Err(DeployError::ConfigError(
                        "Webhook URL is not configured for this server.".to_string(),
                    ));
                }
            }
            DeployMethod::Beacon => {
                if non_empty(&self.beacon_url).is_none() {
                    return Err(DeployError::ConfigError(
                        "Beacon URL is not configured for this server.".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// "[id] name (url)" label used in prompts and listings
    pub fn label(&self) -> String {
        format!("[{}] {} ({})", self.id, self.name, self.url)
    }
}

/// Trimmed value of an optional field, `None` when blank
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Strip a single trailing slash so `https://x.com/` matches `https://x.com`
pub fn normalize_url(url: &str) -> &str {
    let url = url.trim();
    url.strip_suffix('/').unwrap_or(url)
}

/// Serde helpers keeping secrets wrapped in memory
mod secret {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(secret) => serializer.serialize_some(secret.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
    }
}
