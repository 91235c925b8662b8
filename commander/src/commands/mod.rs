//! Command line commands

pub mod deploy;
pub mod list;
pub mod logs;
pub mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::errors::DeployError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::storage::{JsonStore, Store};

/// Every selected server deployed (or nothing to do)
pub const EXIT_OK: u8 = 0;

/// At least one deployment failed
pub const EXIT_FAILURE: u8 = 1;

/// Nothing matched the selection
pub const EXIT_NO_MATCH: u8 = 2;

/// State shared by the commands
pub struct AppContext {
    pub layout: StorageLayout,
    pub settings: Settings,
    pub store: Arc<dyn Store>,
}

impl AppContext {
    /// Load settings and open the store under `home` (or the default home)
    pub async fn load(home: Option<PathBuf>) -> Result<Self, DeployError> {
        let layout = home.map(StorageLayout::new).unwrap_or_default();
        let settings = Settings::load(&layout.settings_file()).await?;
        let store: Arc<dyn Store> = Arc::new(JsonStore::new(&layout));

        Ok(Self {
            layout,
            settings,
            store,
        })
    }

    /// Directory archives are staged in
    pub fn staging_dir(&self) -> PathBuf {
        self.settings
            .staging_dir
            .clone()
            .unwrap_or_else(|| self.layout.staging_dir())
    }
}

/// Render rows as aligned columns
///
/// `paint` receives the column index, the raw cell and the padded cell, and
/// returns what is printed, so colors never disturb the alignment.
pub fn render_table<F>(headers: &[&str], rows: &[Vec<String>], paint: F) -> String
where
    F: Fn(usize, &str, String) -> String,
{
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let last = headers.len().saturating_sub(1);
    let pad = |i: usize, text: &str| {
        if i == last {
            text.to_string()
        } else {
            format!("{:<width$}", text, width = widths[i])
        }
    };

    let mut out = String::new();
    let header: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| pad(i, h).bold().to_string())
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .take(headers.len())
            .map(|(i, cell)| paint(i, cell, pad(i, cell)))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Color a deploy status badge
pub fn paint_badge(badge: &str, padded: String) -> String {
    match badge {
        "success" => padded.green().to_string(),
        "failed" => padded.red().to_string(),
        "running" => padded.yellow().to_string(),
        _ => padded.dimmed().to_string(),
    }
}
