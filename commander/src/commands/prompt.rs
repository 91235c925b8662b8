//! Terminal prompts

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Select};

use crate::deploy::Prompt;
use crate::errors::DeployError;
use crate::models::Server;

/// Prompts on the controlling terminal
pub struct TerminalPrompt {
    theme: ColorfulTheme,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn pick_server(&self, servers: &[Server]) -> Result<Option<usize>, DeployError> {
        let labels: Vec<String> = servers.iter().map(Server::label).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Which server do you want to deploy?")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        Ok(selection)
    }

    fn confirm_deploy(&self, server: &Server) -> Result<bool, DeployError> {
        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt(format!("Deploy {} ({})?", server.name, server.url))
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}
