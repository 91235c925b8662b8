//! `deployctl list`

use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use crate::commands::{paint_badge, render_table, AppContext};
use crate::errors::DeployError;
use crate::models::{status_badge, DeployLog, DeployMethod, Server, ServerStatus};
use crate::storage::Store;
use crate::utils::relative_time;

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Include inactive and non-deployable servers
    #[arg(long)]
    pub all: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// A server with its most recent deploy log
#[derive(Debug, Clone)]
pub struct ServerRow {
    pub server: Server,
    pub last_log: Option<DeployLog>,
}

/// Public view of a server, without credentials
#[derive(Debug, Serialize)]
pub struct ServerSummary {
    pub id: u64,
    pub name: String,
    pub url: String,
    pub deploy_method: DeployMethod,
    pub status: ServerStatus,
    pub is_active: bool,
    pub last_deploy_at: Option<DateTime<Utc>>,
    pub last_version: Option<String>,
    pub last_result: &'static str,
}

impl From<&ServerRow> for ServerSummary {
    fn from(row: &ServerRow) -> Self {
        Self {
            id: row.server.id,
            name: row.server.name.clone(),
            url: row.server.url.clone(),
            deploy_method: row.server.deploy_method,
            status: row.server.status,
            is_active: row.server.is_active,
            last_deploy_at: row.server.last_deploy_at,
            last_version: row.server.last_version.clone(),
            last_result: status_badge(row.last_log.as_ref()),
        }
    }
}

pub async fn load_rows(store: &dyn Store, include_all: bool) -> Result<Vec<ServerRow>, DeployError> {
    let mut rows = Vec::new();
    for server in store.list_servers().await? {
        if !include_all && !server.is_deployable() {
            continue;
        }
        let last_log = store.list_logs(Some(server.id), 1).await?.into_iter().next();
        rows.push(ServerRow { server, last_log });
    }
    Ok(rows)
}

pub fn render(rows: &[ServerRow], now: DateTime<Utc>) -> String {
    let headers = ["ID", "NAME", "URL", "METHOD", "STATUS", "LAST DEPLOY", "VERSION", "RESULT"];
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let server = &row.server;
            vec![
                server.id.to_string(),
                server.name.clone(),
                server.url.clone(),
                server.deploy_method.as_str().to_string(),
                if server.is_active {
                    server.status.as_str().to_string()
                } else {
                    format!("{} (inactive)", server.status.as_str())
                },
                server
                    .last_deploy_at
                    .map(|at| relative_time(at, now))
                    .unwrap_or_else(|| "never".to_string()),
                server.last_version.clone().unwrap_or_else(|| "-".to_string()),
                status_badge(row.last_log.as_ref()).to_string(),
            ]
        })
        .collect();

    render_table(&headers, &cells, |col, raw, padded| match col {
        7 => paint_badge(raw, padded),
        _ => padded,
    })
}

pub async fn run(ctx: &AppContext, args: &ListArgs) -> anyhow::Result<()> {
    let rows = load_rows(ctx.store.as_ref(), args.all).await?;

    if args.json {
        let summaries: Vec<ServerSummary> = rows.iter().map(ServerSummary::from).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("{}", "No servers found.".yellow());
        if !args.all {
            println!("Use {} to include inactive servers.", "deployctl list --all".cyan());
        }
        return Ok(());
    }

    print!("{}", render(&rows, Utc::now()));
    Ok(())
}
