use anyhow::Context;
use std::sync::Arc;

use tokio::sync::watch;

use instance::config::Config;
use instance::error::ElectionError;
use instance::launch::{parse_launch_arg, LaunchOutcome, ParsedLaunchInput, Session};
use instance::paths::first_8;

use super::console::ConsoleWindow;

pub(crate) async fn run_launch(cfg: Config, arg: Option<String>) -> anyhow::Result<()> {
    let input = match parse_launch_arg(arg.as_deref()) {
        Ok(v) => v,
        Err(e) => {
            // An unreadable file still gets a window, just an empty one.
            log::warn!("launch: {e:?}; starting without payload");
            ParsedLaunchInput::default()
        }
    };

    // Ctrl-C is the only way out of the watch loop besides process exit.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut session = Session::start(cfg, Arc::new(ConsoleWindow), input, shutdown_rx).await;
    let id = session.identity().id().to_string();

    match session.elect().await {
        Ok(LaunchOutcome::HandedOff) => {
            println!("handed off to running instance");
            return Ok(());
        }
        Ok(LaunchOutcome::ServingAsDefault { created_window }) => {
            println!(
                "instance {}: serving as default (window created now: {})",
                first_8(&id),
                created_window
            );
        }
        Err(ElectionError::Cancelled) => return Ok(()),
        Err(e) => return Err(e).context("election"),
    }

    session.serve_until_shutdown().await;
    Ok(())
}
