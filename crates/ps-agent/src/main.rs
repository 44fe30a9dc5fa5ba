//! Pub/sub agent: bridges application events to pub/sub backends.
//!
//! Opens one connection per configured integration, publishes uplink events
//! read from stdin, and logs downlinks received from the backends.

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ps_agent::config::AgentConfig;
use ps_agent::{Bridge, IntegrationEvent, uplinks};
use ps_provider::ProviderRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ps-agent starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/ps-agent/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;
    config.validate()?;
    tracing::info!(
        integrations = config.integrations.len(),
        formats = ?ps_formatters::names(),
        "config loaded"
    );

    // ── Provider registry ───────────────────────────────────────
    let registry = ps_provider::install(ProviderRegistry::with_defaults())?;
    tracing::info!(providers = registry.len(), "provider registry installed");

    // ── Shutdown signal ─────────────────────────────────────────
    let (cancel, mut shutdown) = ps_provider::cancel_pair();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
        cancel.cancel();
    });

    // ── Integrations ────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel(256);
    let bridge = Bridge::start(&config, registry, Some(shutdown.clone()), event_tx).await;
    tokio::spawn(log_events(event_rx));

    tracing::info!(running = bridge.len(), "ps-agent ready");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        () = async {
            let stats = uplinks::run(stdin, &bridge).await;
            tracing::info!(
                published = stats.published,
                skipped = stats.skipped,
                invalid = stats.invalid,
                "uplink input closed"
            );
            std::future::pending::<()>().await
        } => {}
        () = shutdown.cancelled() => {}
    }

    bridge.shutdown(config.shutdown_timeout()).await;
    tracing::info!("ps-agent stopped");
    Ok(())
}

/// Log decoded downlink traffic until every integration has stopped.
async fn log_events(mut events: mpsc::Receiver<IntegrationEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            IntegrationEvent::Downlinks { ids, downlinks } => {
                tracing::info!(
                    pub_sub = %ids,
                    count = downlinks.downlinks.len(),
                    "downlinks pushed"
                );
            }
            IntegrationEvent::QueueReplace { ids, request } => {
                tracing::info!(
                    pub_sub = %ids,
                    device_id = %request.end_device_ids.device_id,
                    count = request.downlinks.len(),
                    "downlink queue replaced"
                );
            }
        }
    }
}
