//! msghub server binary.
//!
//! Parses flags, sets up logging and signal handling, and runs the hub until
//! interrupted. See the `msghub` library for the hub itself.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use msghub::{Hub, HubConfig};
use tokio_util::sync::CancellationToken;

// CLI
#[derive(Parser, Debug)]
#[command(name = "msghub")]
#[command(version)]
#[command(about = "In-memory message hub for line-oriented TCP clients")]
struct Cli {
    /// Listen on address (host:port)
    #[arg(long, env = "MSGHUB_ADDR")]
    addr: Option<String>,

    /// Path to a JSON config file
    #[arg(long, env = "MSGHUB_CONFIG")]
    config: Option<PathBuf>,
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        log::info!("Got signal, cleaning up...");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("Could not install SIGTERM handler: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Could not listen for Ctrl-C: {e}");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::error!("Could not listen for Ctrl-C: {e}");
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Could not listen for Ctrl-C: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = HubConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        config.listen_addr = addr;
    }
    let addr = config.listen_addr.clone();

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let hub = Hub::new(config, &shutdown);
    hub.start(&addr).await?;

    log::info!("Hub stopped");
    Ok(())
}
