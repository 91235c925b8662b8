//! Data models

pub mod deploy_log;
pub mod server;

pub use deploy_log::{status_badge, DeployLog, DeployStatus, TriggerSource};
pub use server::{normalize_url, DeployMethod, Server, ServerStatus, SshAuthMethod};
