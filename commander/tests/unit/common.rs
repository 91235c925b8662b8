//! Shared fixtures

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use deploy_commander::deploy::{ArchiveBuilder, Prompt};
use deploy_commander::errors::DeployError;
use deploy_commander::models::{DeployLog, DeployStatus, Server, TriggerSource};
use deploy_commander::storage::{MemoryStore, Store};
use deploy_commander::transport::{Operation, Transport, TransportOutput, TransportProvider, UploadOutcome};

/// How a mock transport answers one kind of call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answered, but with a non-zero exit code
    ExitCode(i32),
    /// Transport failure carrying remote output
    Error(String),
}

/// Transport recording every call
#[derive(Default)]
pub struct MockTransport {
    pub calls: Mutex<Vec<String>>,
    replies: HashMap<String, Reply>,
    no_remote_path: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls of `kind` (`sync`, `script`, `command`, `extract`, `upload`) with `reply`
    pub fn replying(mut self, kind: &str, reply: Reply) -> Self {
        self.replies.insert(kind.to_string(), reply);
        self
    }

    pub fn without_remote_path(mut self) -> Self {
        self.no_remote_path = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, kind: &str, call: String) -> Result<TransportOutput, DeployError> {
        self.calls.lock().unwrap().push(call.clone());
        match self.replies.get(kind) {
            None => Ok(TransportOutput::success(format!("{} ok", call))),
            Some(Reply::ExitCode(code)) => Ok(TransportOutput {
                ok: true,
                output: format!("{} exited {}", call, code),
                exit_code: Some(*code),
                error: None,
            }),
            Some(Reply::Error(output)) => Err(DeployError::transport(format!("{} failed", call), output.clone())),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, _server: &Server, operation: &Operation) -> Result<TransportOutput, DeployError> {
        match operation {
            Operation::SyncSource => self.answer("sync", "sync".to_string()),
            Operation::RunScript { name, .. } => self.answer("script", format!("script:{}", name)),
            Operation::RunCommand { command } => self.answer("command", format!("command:{}", command)),
            Operation::ExtractFiles { files } => {
                let remotes: Vec<&str> = files.values().map(String::as_str).collect();
                self.answer("extract", format!("extract:{}", remotes.join(",")))
            }
        }
    }

    async fn upload_file(&self, _server: &Server, local_path: &Path) -> Result<UploadOutcome, DeployError> {
        let name = local_path.file_name().unwrap().to_string_lossy().into_owned();
        self.answer("upload", "upload".to_string())?;
        Ok(UploadOutcome {
            remote_path: (!self.no_remote_path).then(|| format!("/tmp/{}", name)),
            output: format!("uploaded {}", name),
        })
    }
}

/// Hands out one transport per server id
#[derive(Default)]
pub struct MockProvider {
    pub transports: HashMap<u64, Arc<MockTransport>>,
}

impl MockProvider {
    pub fn with(mut self, server_id: u64, transport: MockTransport) -> Self {
        self.transports.insert(server_id, Arc::new(transport));
        self
    }

    pub fn calls(&self, server_id: u64) -> Vec<String> {
        self.transports
            .get(&server_id)
            .map(|t| t.calls())
            .unwrap_or_default()
    }
}

impl TransportProvider for MockProvider {
    fn transport_for(&self, server: &Server) -> Result<Arc<dyn Transport>, DeployError> {
        let transport: Arc<dyn Transport> = self
            .transports
            .get(&server.id)
            .cloned()
            .ok_or_else(|| DeployError::ConfigError(format!("no transport for {}", server.id)))?;
        Ok(transport)
    }
}

/// Prompt answering from a script
#[derive(Default)]
pub struct ScriptedPrompt {
    pub pick: Option<usize>,
    pub answers: Mutex<VecDeque<bool>>,
    pub asked: Mutex<Vec<String>>,
    /// Confirmation for this server name fails like a closed terminal
    pub broken_for: Option<String>,
}

impl ScriptedPrompt {
    pub fn confirming(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn picking(index: usize) -> Self {
        Self {
            pick: Some(index),
            ..Default::default()
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn pick_server(&self, servers: &[Server]) -> Result<Option<usize>, DeployError> {
        self.asked
            .lock()
            .unwrap()
            .push(format!("pick from {}", servers.len()));
        Ok(self.pick)
    }

    fn confirm_deploy(&self, server: &Server) -> Result<bool, DeployError> {
        self.asked.lock().unwrap().push(format!("confirm {}", server.name));
        if self.broken_for.as_deref() == Some(server.name.as_str()) {
            return Err(DeployError::PromptError("not a terminal".to_string()));
        }
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

/// Archiver writing a placeholder bundle; fails for codes starting with `Missing.`
#[derive(Default)]
pub struct FakeArchiver {
    pub built: Mutex<Vec<Vec<String>>>,
}

impl ArchiveBuilder for FakeArchiver {
    fn build_bundle(&self, output_path: &Path, codes: &[String]) -> Result<(), DeployError> {
        if let Some(code) = codes.iter().find(|c| c.starts_with("Missing.")) {
            return Err(DeployError::LocalBuildError(format!("Plugin {} not found", code)));
        }
        std::fs::write(output_path, b"PK\x05\x06").unwrap();
        self.built.lock().unwrap().push(codes.to_vec());
        Ok(())
    }
}

/// Store whose server touches always fail
pub struct UntouchableStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl Store for UntouchableStore {
    async fn list_servers(&self) -> Result<Vec<Server>, DeployError> {
        self.inner.list_servers().await
    }

    async fn touch_server(&self, _id: u64, _deployed_at: DateTime<Utc>, _version: &str) -> Result<(), DeployError> {
        Err(DeployError::StorageError("servers table is read-only".to_string()))
    }

    async fn remove_server(&self, id: u64) -> Result<bool, DeployError> {
        self.inner.remove_server(id).await
    }

    async fn create_log(&self, server_id: u64, triggered_by: TriggerSource) -> Result<DeployLog, DeployError> {
        self.inner.create_log(server_id, triggered_by).await
    }

    async fn finalize_log(&self, id: u64, status: DeployStatus, output: String) -> Result<DeployLog, DeployError> {
        self.inner.finalize_log(id, status, output).await
    }

    async fn list_logs(&self, server_id: Option<u64>, limit: usize) -> Result<Vec<DeployLog>, DeployError> {
        self.inner.list_logs(server_id, limit).await
    }
}

/// Active webhook server at `https://<name>.test`
pub fn server(id: u64, name: &str) -> Server {
    let host = name.to_lowercase();
    let mut server = Server::new(id, name, format!("https://{}.test", host));
    server.webhook_url = Some(format!("https://{}.test/hooks/deploy", host));
    server
}

/// A request captured by [`HttpStub`]
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Lowercased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Minimal HTTP server answering queued responses, one per connection
pub struct HttpStub {
    pub url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl HttpStub {
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                if let Some(request) = read_request(&mut socket).await {
                    captured.lock().unwrap().push(request);
                }
                let reply = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    })
}
