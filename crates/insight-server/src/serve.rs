use crate::config::Config;
use crate::http::{self, AppState, InsightMetrics};
use crate::sweeper::CacheSweeper;
use anyhow::Context;
use insight_core::{
    InsightEngine, InsightObserver, SimulatedProfileProvider, SimulatedTransactionsProvider,
};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!("Starting Insight server v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP: {}", config.http_addr);
    info!(
        "Request deadline: {:?}, cache TTL: {}s",
        config.request_timeout(),
        config.cache_ttl_secs
    );

    // Upstreams are simulated in-process
    let profile = Arc::new(SimulatedProfileProvider::new(config.profile_latency()));
    let transactions = Arc::new(SimulatedTransactionsProvider::new(
        config.transactions_latency(),
    ));
    info!(
        "Simulated upstreams: profile {:?}, transactions {:?}",
        profile.latency, transactions.latency
    );

    let metrics = Arc::new(InsightMetrics::new());
    let engine = Arc::new(
        InsightEngine::new(profile, transactions, config.insight_config())
            .with_observer(metrics.clone() as Arc<dyn InsightObserver>),
    );
    info!("Insight engine ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start cache sweeper
    let sweeper_task = match config.sweep_interval() {
        Some(interval) => {
            let sweeper = CacheSweeper::new(engine.clone(), interval);
            Some(tokio::spawn(sweeper.run(shutdown_rx.clone())))
        }
        None => {
            info!("Cache sweeper disabled");
            None
        }
    };

    // Start HTTP server
    let app_state = AppState {
        engine: engine.clone(),
        metrics,
        request_timeout: config.request_timeout(),
        start_time: std::time::Instant::now(),
    };
    let app = http::create_router(app_state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {}", config.http_addr))?;

    let mut server_shutdown = shutdown_rx.clone();
    let mut http_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    info!("Insight server ready");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining in-flight requests...");
        }
        result = &mut http_task => {
            let _ = shutdown_tx.send(true);
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP server failed")),
                Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
            };
        }
    }

    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_timeout(), &mut http_task).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => error!("HTTP server failed during shutdown: {}", e),
        Ok(Err(e)) => error!("HTTP server task failed: {}", e),
        Err(_) => {
            warn!(
                "Graceful shutdown exceeded {:?}, aborting remaining requests",
                config.shutdown_timeout()
            );
            http_task.abort();
        }
    }

    if let Some(task) = sweeper_task {
        if let Err(e) = task.await {
            error!("Cache sweeper task failed: {}", e);
        }
    }

    info!("Insight server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
