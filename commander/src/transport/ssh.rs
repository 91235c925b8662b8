//! SSH transport
//!
//! Runs remote shell pipelines through the system `ssh` client and copies
//! files with `scp`. Password authentication goes through `sshpass -e`, with
//! the password placed in that one child's environment.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::server::non_empty;
use crate::models::{Server, SshAuthMethod};
use crate::storage::settings::SshSettings;
use crate::transport::{remote_shell_command, FileMap, Operation, Transport, TransportOutput, UploadOutcome};

/// Remote directory, relative to the deploy path, archives are unpacked into
pub const EXTRACT_DIR: &str = "plugins";

/// Remote directory uploads land in
pub const UPLOAD_DIR: &str = "/tmp";

/// Secret handed to a single spawned process
#[derive(Debug, Clone)]
pub struct SpawnCredential {
    env_var: &'static str,
    secret: SecretString,
}

/// A fully resolved process invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub credential: Option<SpawnCredential>,
}

impl Invocation {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(credential) = &self.credential {
            command.env(credential.env_var, credential.secret.expose_secret());
        }

        command
    }
}

/// SSH transport
pub struct SshTransport {
    settings: SshSettings,
}

impl SshTransport {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    /// Spawn the invocation and collect its combined output
    async fn run(&self, invocation: Invocation, what: &str) -> Result<String, DeployError> {
        debug!("Running {} via {}", what, invocation.program);

        let child = invocation.command().spawn().map_err(|e| {
            DeployError::transport(format!("Failed to run {}: {}", invocation.program, e), "")
        })?;

        let output = run_with_timeout(child, self.settings.timeout()).await.map_err(|e| match e {
            RunError::Timeout => DeployError::transport(
                format!("{} timed out after {}s", what, self.settings.timeout_secs),
                "",
            ),
            RunError::Io(e) => DeployError::transport(format!("{} failed: {}", what, e), ""),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(DeployError::transport(format!("{} failed (exit {})", what, code), combined));
        }

        Ok(combined)
    }
}

enum RunError {
    Timeout,
    Io(std::io::Error),
}

async fn run_with_timeout(
    child: tokio::process::Child,
    timeout: Duration,
) -> Result<std::process::Output, RunError> {
    // dropping the future on timeout kills the child (kill_on_drop)
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(RunError::Io),
        Err(_) => Err(RunError::Timeout),
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn execute(&self, server: &Server, operation: &Operation) -> Result<TransportOutput, DeployError> {
        validate(server)?;

        let (script, what) = match operation {
            Operation::SyncSource => (build_sync_script(server)?, "SSH deployment".to_string()),
            Operation::RunScript { name, .. } => (build_named_script(server, name)?, format!("Remote script {name}")),
            Operation::RunCommand { command } => {
                (build_named_script(server, command)?, format!("Remote command {command}"))
            }
            Operation::ExtractFiles { files } => {
                if files.is_empty() {
                    return Ok(TransportOutput::success("No archives to extract"));
                }
                (build_extract_script(server, files)?, "Archive extraction".to_string())
            }
        };

        info!("[{}] {} on {}", server.name, what, server.ssh_host.as_deref().unwrap_or_default());
        let invocation = ssh_invocation(&self.settings, server, &script)?;
        let output = self.run(invocation, &what).await?;
        Ok(TransportOutput::success(output))
    }

    async fn upload_file(&self, server: &Server, local_path: &Path) -> Result<UploadOutcome, DeployError> {
        validate(server)?;

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DeployError::UploadError(format!("Invalid upload path: {}", local_path.display())))?;
        let remote_path = format!("{}/{}", UPLOAD_DIR, file_name);

        info!("[{}] Uploading {} to {}", server.name, local_path.display(), remote_path);
        let invocation = scp_invocation(&self.settings, server, local_path, &remote_path)?;
        let output = self.run(invocation, "SCP upload").await?;

        Ok(UploadOutcome {
            remote_path: Some(remote_path),
            output,
        })
    }
}

fn validate(server: &Server) -> Result<(), DeployError> {
    if non_empty(&server.ssh_host).is_none()
        || non_empty(&server.ssh_user).is_none()
        || non_empty(&server.deploy_path).is_none()
    {
        return Err(DeployError::ConfigError(
            "SSH host, user and deploy path must be configured.".to_string(),
        ));
    }
    Ok(())
}

/// Hook lines, trimmed, without blanks and `#` comments
pub fn parse_hooks(hooks: &str) -> Vec<&str> {
    hooks
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn deploy_path(server: &Server) -> Result<String, DeployError> {
    let path = non_empty(&server.deploy_path)
        .ok_or_else(|| DeployError::ConfigError("Deploy path is not configured.".to_string()))?;
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}

/// `cd <path> && <before…> && git fetch --all && git checkout <branch> && git pull origin <branch> && <after…>`
pub fn build_sync_script(server: &Server) -> Result<String, DeployError> {
    let branch = shell_quote(server.branch());
    let mut parts = vec![format!("cd {}", shell_quote(&deploy_path(server)?))];

    parts.extend(parse_hooks(server.before_hooks.as_deref().unwrap_or_default()).into_iter().map(String::from));
    parts.push("git fetch --all".to_string());
    parts.push(format!("git checkout {}", branch));
    parts.push(format!("git pull origin {}", branch));
    parts.extend(parse_hooks(server.after_hooks.as_deref().unwrap_or_default()).into_iter().map(String::from));

    Ok(parts.join(" && "))
}

/// `cd <path> && <mapped command>`
pub fn build_named_script(server: &Server, name: &str) -> Result<String, DeployError> {
    let command = remote_shell_command(server, name)
        .ok_or_else(|| DeployError::ConfigError(format!("No remote command configured for `{}`", name)))?;
    Ok(format!("cd {} && {}", shell_quote(&deploy_path(server)?), command))
}

/// Unzip every uploaded archive into the plugins directory, removing it afterwards
pub fn build_extract_script(server: &Server, files: &FileMap) -> Result<String, DeployError> {
    let mut parts = vec![format!("cd {}", shell_quote(&deploy_path(server)?))];
    for remote in files.values() {
        let remote = shell_quote(remote);
        parts.push(format!("unzip -o -q {} -d {}", remote, EXTRACT_DIR));
        parts.push(format!("rm -f {}", remote));
    }
    Ok(parts.join(" && "))
}

fn connection_args(server: &Server, port_flag: &str) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        // hosts are reached over a trusted network
        "StrictHostKeyChecking=no".to_string(),
        port_flag.to_string(),
        server.ssh_port.to_string(),
    ];

    if server.ssh_auth_method == SshAuthMethod::Key {
        if let Some(key) = &server.ssh_key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
    }

    args
}

fn destination(server: &Server) -> String {
    format!(
        "{}@{}",
        server.ssh_user.as_deref().unwrap_or_default().trim(),
        server.ssh_host.as_deref().unwrap_or_default().trim()
    )
}

/// Wrap in `sshpass -e` when password authentication is configured
fn wrap_password(settings: &SshSettings, server: &Server, program: &str, args: Vec<String>) -> Invocation {
    match (&server.ssh_auth_method, &server.ssh_password) {
        (SshAuthMethod::Password, Some(password)) if !password.expose_secret().is_empty() => {
            let mut wrapped = vec!["-e".to_string(), program.to_string()];
            wrapped.extend(args);
            Invocation {
                program: settings.sshpass_program.clone(),
                args: wrapped,
                credential: Some(SpawnCredential {
                    env_var: "SSHPASS",
                    secret: password.clone(),
                }),
            }
        }
        _ => Invocation {
            program: program.to_string(),
            args,
            credential: None,
        },
    }
}

/// Build the ssh invocation running `script` on the server
pub fn ssh_invocation(settings: &SshSettings, server: &Server, script: &str) -> Result<Invocation, DeployError> {
    validate(server)?;
    let mut args = connection_args(server, "-p");
    args.push(destination(server));
    args.push(script.to_string());
    Ok(wrap_password(settings, server, &settings.program, args))
}

/// Build the scp invocation copying `local` to `remote` on the server
pub fn scp_invocation(
    settings: &SshSettings,
    server: &Server,
    local: &Path,
    remote: &str,
) -> Result<Invocation, DeployError> {
    validate(server)?;
    let mut args = connection_args(server, "-P");
    args.push(local.display().to_string());
    args.push(format!("{}:{}", destination(server), remote));
    Ok(wrap_password(settings, server, &settings.scp_program, args))
}

/// Single-quote a word for the remote shell unless it is plainly safe
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '~' | '@' | '+'));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
