//! autodrive - device automation agent
//!
//! Usage:
//!   autodrive run --url ws://host:8080/ws   Serve commands from a control server
//!   autodrive capabilities                  Print the action listing
//!   autodrive scripts list                  List installed scripts
//!   autodrive exec press_back               Run one action locally
//!   autodrive --help                        Show all commands

use anyhow::Result;
use clap::Parser;

use autodrive::cli::output::OutputMode;
use autodrive::cli::Cli;
use autodrive::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr, keeping stdout for command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autodrive=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);
    let ctx = AppContext::new(cli.data_path.clone()).await?;
    autodrive::cli::execute(&cli.command, &ctx, mode).await?;

    Ok(())
}
