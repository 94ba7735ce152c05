use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use txrisk::api::routes::{create_router, AppState};
use txrisk::config::Config;
use txrisk::engine::RiskEngine;
use txrisk::observability::{init_tracing, MetricsRegistry};
use txrisk::policy::{FileRuleStore, RuleFileLoader, RuleFileWatcher};
use txrisk::storage::{MemoryStorage, PostgresStorage, RuleStore, TransactionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        signal_failure_policy = %config.signal_failure_policy,
        "Starting txrisk engine"
    );

    let metrics = Arc::new(MetricsRegistry::new());

    // Storage backends. Postgres serves both rules and history when configured;
    // otherwise rules come from the hot-reloaded file and history stays in memory.
    let mut watcher_handle = None;
    let (rule_store, tx_store): (Arc<dyn RuleStore>, Arc<dyn TransactionStore>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let pg = Arc::new(
                    PostgresStorage::connect(
                        url,
                        config.db_min_connections,
                        config.db_max_connections,
                    )
                    .await?,
                );
                pg.run_migrations().await?;
                info!("Using Postgres storage");
                (pg.clone() as Arc<dyn RuleStore>, pg as Arc<dyn TransactionStore>)
            }
            None => {
                let watcher = RuleFileWatcher::new(
                    RuleFileLoader::new(&config.rules_path),
                    config.rules_reload_interval(),
                    metrics.clone(),
                );
                let (rules_rx, handle) = watcher.start();
                watcher_handle = Some(handle);

                let file_store = FileRuleStore::new(rules_rx);
                if file_store.version().is_none() {
                    warn!(
                        path = %config.rules_path.display(),
                        "No rule file loaded, evaluations fail until one is"
                    );
                }

                warn!("No DATABASE_URL configured, transaction history is kept in memory");
                (
                    Arc::new(file_store) as Arc<dyn RuleStore>,
                    Arc::new(MemoryStorage::new()) as Arc<dyn TransactionStore>,
                )
            }
        };

    let engine = RiskEngine::new(rule_store, tx_store, metrics.clone())
        .with_options(config.engine_options());

    // Create application state
    let state = Arc::new(AppState {
        engine: Arc::new(engine),
        metrics,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        latency_budget_ms: config.latency_budget_ms,
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        let shutdown_timeout = config.shutdown_timeout();
        let (signalled_tx, mut signalled_rx) = watch::channel(false);

        let mut server = tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_signal().await;
                    let _ = signalled_tx.send(true);
                })
                .into_future(),
        );

        tokio::select! {
            result = &mut server => result??,
            _ = signalled_rx.changed() => {
                // In-flight requests get a bounded drain period
                match tokio::time::timeout(shutdown_timeout, &mut server).await {
                    Ok(result) => result??,
                    Err(_) => warn!(
                        timeout_secs = shutdown_timeout.as_secs(),
                        "Graceful shutdown timed out"
                    ),
                }
            }
        }
    } else {
        axum::serve(listener, app).await?;
    }

    // Cleanup
    info!("Shutting down...");
    if let Some(handle) = watcher_handle {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
