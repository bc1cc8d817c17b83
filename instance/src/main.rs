mod cmd;

use clap::Parser;
use std::path::PathBuf;

use instance::config::{config_path, load_config_from, Config};

#[derive(Parser)]
#[command(name = "orbx")]
struct Cli {
    /// Directory for channel sockets (overrides the config file and ORBX_RUNTIME_DIR).
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Config file (defaults to <config dir>/orbx/instance.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Internal: invoked by the updater to notify the running default instance.
    #[arg(long, hide = true)]
    notify_update: bool,

    /// JSON state file to open, or an orbx:// link.
    target: Option<String>,
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        // Explicit path: a broken file is an error.
        Some(p) => load_config_from(p)?,
        None => {
            let p = config_path();
            if p.exists() {
                load_config_from(&p).unwrap_or_else(|e| {
                    log::warn!("config: {e:?}; using defaults");
                    Config::default()
                })
            } else {
                Config::default()
            }
        }
    };
    if let Some(d) = &cli.runtime_dir {
        cfg.runtime_dir = Some(d.clone());
    }
    Ok(cfg)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Enable logging when the user sets RUST_LOG (kept quiet by default).
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();

    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;
    log::debug!(
        "orbx: base={} runtime_dir={}",
        cfg.base_name,
        cfg.runtime_dir().display()
    );

    if cli.notify_update {
        return cmd::notify::run_notify(cfg).await;
    }
    cmd::launch::run_launch(cfg, cli.target).await
}
