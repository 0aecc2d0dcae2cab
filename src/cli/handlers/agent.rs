//! `run`: serve commands from the control server.

use anyhow::Result;

use crate::cli::output::{print_hint, print_success};
use crate::init::{Agent, AppContext};

pub async fn handle_run(ctx: &AppContext, url: Option<&str>) -> Result<()> {
    let Agent { client, executor } = ctx.agent(url).await?;
    let handle = client.handle();

    print_success(&format!(
        "Agent '{}' starting with {} actions",
        ctx.info.device_name,
        ctx.bus.len()
    ));
    print_hint("Press Ctrl-C to stop.");

    let mut session = tokio::spawn(async move { client.run().await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown requested");
        }
        finished = &mut session => {
            // The session only returns on its own after a shutdown elsewhere.
            finished??;
            executor.stop();
            executor.join().await;
            return Ok(());
        }
    }

    executor.stop();
    handle.shutdown();
    session.await??;
    executor.join().await;
    print_success("Agent stopped");
    Ok(())
}
