//! `deployctl logs`

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;

use crate::commands::{paint_badge, render_table, AppContext};
use crate::models::DeployLog;
use crate::utils::relative_time;

#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Only logs of this server id
    #[arg(long)]
    pub server: Option<u64>,

    /// Maximum number of logs, newest first
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Print each log's output below the table
    #[arg(long)]
    pub output: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn render(logs: &[DeployLog], names: &HashMap<u64, String>, now: DateTime<Utc>) -> String {
    let rows: Vec<Vec<String>> = logs
        .iter()
        .map(|log| {
            let server = match log.server_id {
                Some(id) => names
                    .get(&id)
                    .map(|name| format!("[{}] {}", id, name))
                    .unwrap_or_else(|| format!("[{}]", id)),
                None => "(removed)".to_string(),
            };
            vec![
                log.id.to_string(),
                server,
                log.triggered_by.as_str().to_string(),
                relative_time(log.deployed_at, now),
                log.status.as_str().to_string(),
            ]
        })
        .collect();

    render_table(&["ID", "SERVER", "TRIGGER", "DEPLOYED", "STATUS"], &rows, |col, raw, padded| {
        match col {
            4 => paint_badge(raw, padded),
            _ => padded,
        }
    })
}

pub async fn run(ctx: &AppContext, args: &LogsArgs) -> anyhow::Result<()> {
    let logs = ctx.store.list_logs(args.server, args.limit).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    if logs.is_empty() {
        println!("{}", "No deployments recorded.".yellow());
        return Ok(());
    }

    let names: HashMap<u64, String> = ctx
        .store
        .list_servers()
        .await?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    print!("{}", render(&logs, &names, Utc::now()));

    if args.output {
        for log in &logs {
            println!();
            println!("{}", format!("--- deploy log {} ---", log.id).bold());
            println!("{}", log.output.trim_end());
        }
    }
    Ok(())
}
