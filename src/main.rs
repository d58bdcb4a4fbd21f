//! `termcored`: process entry point.
//!
//! Wires the store, engine registry, health monitor, pty adapter, and
//! broker together, then serves the HTTP/WS surface until `SIGINT`.

use std::sync::Arc;
use std::time::Duration;
use termcore::broker::Broker;
use termcore::bus::EventBus;
use termcore::config::Config;
use termcore::engine::EngineRegistry;
use termcore::health::HealthMonitor;
use termcore::http::build_router;
use termcore::pty::system::SystemPty;
use termcore::store::ConversationStore;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();
    log::info!("starting termcored, am_root={:?}, bind_addr={}", config.am_root, config.bind_addr);

    let store = Arc::new(ConversationStore::new(config.am_root.clone())?);
    let startup_counters = store.validate_existing();
    log::info!(
        "startup scan: {} valid, {} corrupt conversation files",
        startup_counters.conversations_validated,
        startup_counters.conversations_corrupted
    );

    let bus = EventBus::new();
    let engines = Arc::new(EngineRegistry::new(store.clone(), bus.clone()));
    let health = HealthMonitor::new(&bus, Duration::from_secs(config.alert_threshold_secs));
    health.record_validation(startup_counters.conversations_validated, startup_counters.conversations_corrupted);

    let pty_adapter = Arc::new(SystemPty::new());
    let broker = Broker::new(pty_adapter, engines.clone(), bus.clone(), &config);

    spawn_health_check_loop(health.clone(), engines.clone());
    spawn_cleanup_loop(store.clone(), health.clone(), config.retention_days);

    let broker_for_shutdown = broker.clone();
    let router = build_router(broker, health);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    log::info!("listening on {}", config.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("flushing live sessions before exit");
    broker_for_shutdown.shutdown();

    log::info!("termcored shut down cleanly");
    Ok(())
}

fn spawn_health_check_loop(health: Arc<HealthMonitor>, engines: Arc<EngineRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        loop {
            interval.tick().await;
            health.perform_health_check();
            health.set_active_conversations(engines.active_conversation_count());
        }
    });
}

fn spawn_cleanup_loop(store: Arc<ConversationStore>, health: Arc<HealthMonitor>, retention_days: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let deleted = store.cleanup(retention_days);
            if deleted > 0 {
                log::info!("cleanup: removed {deleted} conversation files older than {retention_days}d");
            }
            let counters = store.validate_existing();
            health.record_validation(counters.conversations_validated, counters.conversations_corrupted);
        }
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("received ctrl-c, shutting down"),
        Err(e) => log::error!("failed to install ctrl-c handler: {e}"),
    }
}
