//! Scaler probe - drives one external trigger the way the control loop does
//!
//! Pull mode evaluates every metric the remote scaler advertises on a fixed
//! interval. Push mode keeps the activity stream open and logs transitions.

use anyhow::{Context, Result};
use scaler_core::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    ConnectionPool, ExternalPushScaler, ExternalScaler, GrpcConnector, PushScaler, Scaler,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const PROBE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::ProbeConfig::load()?;
    let logger = StructuredLogger::new(config.workload());
    logger.log_startup(PROBE_VERSION, config.push);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CONNECTION_POOL).await;

    let cancel = CancellationToken::new();
    let api_shutdown = CancellationToken::new();
    let mut api_handle = tokio::spawn(api::serve(
        config.api_port,
        api::ProbeState::new(health_registry.clone()),
        api_shutdown.clone(),
    ));

    let pool = Arc::new(ConnectionPool::new(GrpcConnector::default()));
    let scaler_config = config.scaler_config();

    let (scaler, handle): (Arc<dyn Scaler>, _) = if config.push {
        let scaler = Arc::new(
            ExternalPushScaler::new(&scaler_config, Arc::clone(&pool))
                .context("Failed to create external push scaler")?,
        );
        health_registry.set_ready(true).await;
        let handle = tokio::spawn(run_push(
            Arc::clone(&scaler),
            cancel.clone(),
            logger.clone(),
        ));
        (scaler as Arc<dyn Scaler>, handle)
    } else {
        let scaler = Arc::new(
            ExternalScaler::new(&scaler_config, Arc::clone(&pool))
                .context("Failed to create external scaler")?,
        );
        health_registry.set_ready(true).await;
        let handle = tokio::spawn(run_pull(
            Arc::clone(&scaler),
            config.poll_interval(),
            cancel.clone(),
            health_registry.clone(),
            logger.clone(),
        ));
        (scaler as Arc<dyn Scaler>, handle)
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => warn!("API server exited"),
            }
            logger.log_shutdown("API server stopped");
        }
    }

    cancel.cancel();
    if let Err(e) = handle.await {
        error!(error = %e, "Trigger worker panicked");
    }
    scaler.close().await?;
    pool.shutdown_all().await;

    api_shutdown.cancel();
    if !api_handle.is_finished() {
        if let Ok(Err(e)) = api_handle.await {
            error!(error = %e, "API server failed during shutdown");
        }
    }
    info!("Shutdown complete");

    Ok(())
}

/// Evaluate every advertised metric once per interval
async fn run_pull(
    scaler: Arc<ExternalScaler<GrpcConnector>>,
    interval: std::time::Duration,
    cancel: CancellationToken,
    health: HealthRegistry,
    logger: StructuredLogger,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut specs = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if specs.is_empty() {
            specs = scaler.get_metric_spec_for_scaling().await;
            if specs.is_empty() {
                let streak = health
                    .record_failure(components::CONNECTION_POOL, "no metric specs from remote scaler")
                    .await;
                logger.log_evaluation_failure("<spec>", "no metric specs", streak);
                continue;
            }
            health.record_success(components::CONNECTION_POOL).await;
            info!(metrics = specs.len(), "Registered metric specs");
        }

        for spec in &specs {
            match scaler.get_metrics_and_activity(&spec.metric_name).await {
                Ok((values, active)) => {
                    health.record_success(&spec.metric_name).await;
                    let values: Vec<f64> = values.iter().map(|v| v.value).collect();
                    logger.log_evaluation(&spec.metric_name, &values, active);
                }
                Err(e) => {
                    let streak = health.record_failure(&spec.metric_name, e.to_string()).await;
                    logger.log_evaluation_failure(&spec.metric_name, &e.to_string(), streak);
                }
            }
        }
    }
}

/// Log activity transitions until the push stream closes
async fn run_push(
    scaler: Arc<ExternalPushScaler<GrpcConnector>>,
    cancel: CancellationToken,
    logger: StructuredLogger,
) {
    let (tx, mut rx) = mpsc::channel(16);
    let runner = tokio::spawn({
        let scaler = Arc::clone(&scaler);
        async move { scaler.run(cancel, tx).await }
    });

    let mut last = None;
    while let Some(active) = rx.recv().await {
        if last != Some(active) {
            logger.log_activity(active);
            last = Some(active);
        }
    }

    if let Err(e) = runner.await {
        error!(error = %e, "Push scaler task panicked");
    }
}
