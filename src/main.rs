use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use argus::collaborators::{InMemoryCandidateSource, InMemoryLedger, NoopAnalyzer, StaticCveLookup};
use argus::config::{Cli, Settings};
use argus::consensus::ConsensusDriver;
use argus::shutdown::shutdown_channel;
use argus::store::{CoordinationStore, Keys, Store, StoreConfig};
use argus::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let settings = Settings::from(&cli);
    info!(node_id = %settings.node_id, store_url = %cli.store_url, "starting argus");

    let store = CoordinationStore::connect(&StoreConfig {
        url: cli.store_url.clone(),
        ..StoreConfig::default()
    })
    .await
    .context("unable to reach coordination store")?;
    let store: Arc<dyn Store> = Arc::new(store);

    let keys = Keys::new(settings.key_prefix.clone());
    let consensus = Arc::new(ConsensusDriver::new(
        store.clone(),
        keys.clone(),
        settings.node_id.clone(),
        settings.lease_ttl,
        settings.node_health_ttl,
        settings.missed_beacon_threshold,
    ));

    let supervisor = Arc::new(Supervisor::new(
        store,
        keys,
        settings,
        consensus,
        Arc::new(InMemoryCandidateSource::with_default_clusters()),
        Arc::new(NoopAnalyzer),
        Arc::new(StaticCveLookup::with_default_database()),
        Arc::new(InMemoryLedger::new()),
    ));

    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    let supervisor_task = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run(shutdown_signal).await }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    shutdown_controller.shutdown();

    supervisor_task.await.context("supervisor task panicked")?;

    info!("argus stopped cleanly");
    Ok(())
}

/// Waits for either SIGINT or, on Unix, SIGTERM.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(%err, "failed to listen for SIGINT");
            }
        }
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
    }
}
