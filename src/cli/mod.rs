//! CLI interface for autodrive.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::OutputMode;

/// autodrive - device automation agent
#[derive(Parser)]
#[command(name = "autodrive", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.autodrive)
    #[arg(long, env = "AUTODRIVE_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the control server and execute commands until Ctrl-C
    Run {
        /// Server websocket url (overrides config and AUTODRIVE_SERVER_URL)
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the capability listing advertised to the server
    Capabilities,

    /// Inspect installed scripts
    Scripts {
        #[command(subcommand)]
        command: ScriptCommands,
    },

    /// Run a single action locally, without a server
    Exec {
        /// Action name (e.g. press_back, start_task)
        action: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[derive(Subcommand)]
pub enum ScriptCommands {
    /// List scripts in the scripts directory
    List,
    /// Show a script's metadata, parameters and scenes
    Show {
        /// Script directory name
        name: String,
    },
    /// Load a script and resolve every scene handler
    Check {
        /// Script directory name
        name: String,
    },
}

/// Execute a one-shot CLI command. `run` is handled by the binary.
pub async fn execute(
    command: &Commands,
    ctx: &crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { url } => handlers::agent::handle_run(ctx, url.as_deref()).await?,
        Commands::Capabilities => handlers::capabilities::handle_capabilities(ctx, mode)?,
        Commands::Scripts { command } => match command {
            ScriptCommands::List => handlers::scripts::handle_list(ctx, mode).await?,
            ScriptCommands::Show { name } => handlers::scripts::handle_show(ctx, name, mode).await?,
            ScriptCommands::Check { name } => {
                handlers::scripts::handle_check(ctx, name, mode).await?
            }
        },
        Commands::Exec { action, params } => {
            handlers::exec::handle_exec(ctx, action, params, mode).await?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let cli = Cli::parse_from(["autodrive", "--json", "exec", "click", "--params", r#"{"x":1,"y":2}"#]);
        assert!(cli.json);
        match cli.command {
            Commands::Exec { action, params } => {
                assert_eq!(action, "click");
                assert_eq!(params, r#"{"x":1,"y":2}"#);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_parse_scripts_show() {
        let cli = Cli::parse_from(["autodrive", "scripts", "show", "daily_checkin"]);
        assert!(matches!(
            cli.command,
            Commands::Scripts { command: ScriptCommands::Show { name } } if name == "daily_checkin"
        ));
    }
}
