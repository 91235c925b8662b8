//! Target server resolution

use crate::errors::DeployError;
use crate::models::{normalize_url, Server};

/// Operator interaction needed while deploying
pub trait Prompt: Send + Sync {
    /// Pick one of `servers`; `None` when the operator backs out
    fn pick_server(&self, servers: &[Server]) -> Result<Option<usize>, DeployError>;

    /// Ask before deploying one server
    fn confirm_deploy(&self, server: &Server) -> Result<bool, DeployError>;
}

/// How the target servers are chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSelector {
    /// Exact URL, trailing slash ignored
    Url(String),

    /// Case-insensitive name substring
    Name(String),

    /// One server by id, whatever its status
    Id(u64),

    /// Every deployable server
    All,

    /// Ask the operator to pick one deployable server
    Interactive,
}

impl ServerSelector {
    /// Selector from command line arguments; `all` wins, then id, name and url
    pub fn from_args(url: Option<String>, name: Option<String>, id: Option<u64>, all: bool) -> Self {
        if all {
            return ServerSelector::All;
        }
        if let Some(id) = id {
            return ServerSelector::Id(id);
        }
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            return ServerSelector::Name(name);
        }
        match url.filter(|u| !u.trim().is_empty()) {
            Some(url) => ServerSelector::Url(url),
            None => ServerSelector::Interactive,
        }
    }

    /// Explicit batch selections deploy without asking per server
    pub fn needs_confirmation(&self) -> bool {
        !matches!(self, ServerSelector::All)
    }

    /// Narrow `servers` down to the targets, in id order
    pub fn resolve(&self, mut servers: Vec<Server>, prompt: &dyn Prompt) -> Result<Vec<Server>, DeployError> {
        servers.sort_by_key(|s| s.id);

        let selected: Vec<Server> = match self {
            ServerSelector::Id(id) => servers.into_iter().filter(|s| s.id == *id).collect(),
            ServerSelector::All => servers.into_iter().filter(Server::is_deployable).collect(),
            ServerSelector::Name(name) => {
                let needle = name.trim().to_lowercase();
                servers
                    .into_iter()
                    .filter(|s| s.is_deployable() && s.name.to_lowercase().contains(&needle))
                    .collect()
            }
            ServerSelector::Url(url) => {
                let wanted = normalize_url(url);
                servers
                    .into_iter()
                    .filter(|s| s.is_deployable() && normalize_url(&s.url) == wanted)
                    .collect()
            }
            ServerSelector::Interactive => {
                let mut candidates: Vec<Server> = servers.into_iter().filter(Server::is_deployable).collect();
                if candidates.is_empty() {
                    Vec::new()
                } else {
                    match prompt.pick_server(&candidates)? {
                        Some(index) if index < candidates.len() => vec![candidates.swap_remove(index)],
                        _ => Vec::new(),
                    }
                }
            }
        };

        if selected.is_empty() {
            return Err(DeployError::NoMatchingServer);
        }
        Ok(selected)
    }
}
