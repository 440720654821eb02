//! Guardian Core - Main Entry Point

use anyhow::Context;
use tokio::sync::broadcast;

use guardian_core::constants;
use guardian_core::logic::{AppContext, ContextOptions};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", constants::APP_NAME, constants::APP_VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let data_dir = constants::get_data_dir();
    let ctx = AppContext::initialize(ContextOptions::new(&data_dir))
        .with_context(|| format!("Failed to initialize agent in {}", data_dir.display()))?;

    log::info!(
        "Protecting {} folder(s), security level {}",
        ctx.vault.protected_folders().len(),
        ctx.monitor.security_level()
    );

    // No UI attached: surface push notifications in the application log
    let mut ui = ctx.notifier.subscribe();
    let bridge = tokio::spawn(async move {
        loop {
            match ui.recv().await {
                Ok(n) => log::info!("[UI] {} {}", n.event, n.payload),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("[UI] {} notifications dropped", missed)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    ctx.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    log::info!("Shutdown requested");

    ctx.shutdown().await;
    bridge.abort();
    Ok(())
}
