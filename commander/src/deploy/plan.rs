//! Step planner
//!
//! Turns deploy options into the ordered list of steps a run executes. The
//! plan is pure: nothing here touches the network or the filesystem.

use std::fmt;

use serde::Serialize;

use crate::transport::{CLEAR_CACHE, MIGRATE_DATABASE};

/// One unit of a deployment plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Step {
    /// Pull the branch or trigger the deploy hook
    SyncSource,

    /// Bundle the given plugin codes into a staged archive
    BuildArchive { codes: Vec<String> },

    /// Upload the staged archive
    UploadFile,

    /// Unpack every uploaded archive on the server
    ExtractFiles,

    RunRemoteScript { name: String },

    RunRemoteCommand { command: String },

    /// Release staged files and record the deployment
    Finalize,
}

impl Step {
    pub fn kind(&self) -> &'static str {
        match self {
            Step::SyncSource => "sync-source",
            Step::BuildArchive { .. } => "build-archive",
            Step::UploadFile => "upload-file",
            Step::ExtractFiles => "extract-files",
            Step::RunRemoteScript { .. } => "run-remote-script",
            Step::RunRemoteCommand { .. } => "run-remote-command",
            Step::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::BuildArchive { codes } => write!(f, "{}({})", self.kind(), codes.join(", ")),
            Step::RunRemoteScript { name } => write!(f, "{}({})", self.kind(), name),
            Step::RunRemoteCommand { command } => write!(f, "{}({})", self.kind(), command),
            _ => f.write_str(self.kind()),
        }
    }
}

/// Inputs of the planner
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Emit a leading source sync step
    pub sync_source: bool,

    /// Skip building and shipping plugin files
    pub skip_files: bool,

    /// Plugin codes to bundle, `Author.Name`
    pub plugin_codes: Vec<String>,
}

/// Build the step list for one server
pub fn plan(options: &PlanOptions) -> Vec<Step> {
    let mut steps = Vec::new();

    if options.sync_source {
        steps.push(Step::SyncSource);
    }

    let codes = normalize_codes(&options.plugin_codes);
    if !options.skip_files && !codes.is_empty() {
        steps.push(Step::BuildArchive { codes });
        steps.push(Step::UploadFile);
        steps.push(Step::ExtractFiles);
    }

    steps.push(Step::RunRemoteScript {
        name: CLEAR_CACHE.to_string(),
    });
    steps.push(Step::RunRemoteCommand {
        command: MIGRATE_DATABASE.to_string(),
    });
    steps.push(Step::Finalize);
    steps
}

/// Trimmed, non-empty, first occurrence wins
fn normalize_codes(codes: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for code in codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(code)) {
            seen.push(code.to_string());
        }
    }
    seen
}
