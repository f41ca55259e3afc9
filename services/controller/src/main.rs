//! kube-start-stop schedule controller
//!
//! Watches Schedules and scales their target workloads whenever one of their
//! weekly windows is active.
//!
//! ## Architecture
//!
//! - **Informer**: Relists Schedule manifests and publishes watch events
//! - **Controller**: Queues Schedule keys and runs the reconcile workers
//! - **Scaler**: Patches the scale subresource (dry run when no API server)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kss_controller::{
    Config, Controller, Informer, InMemoryScaler, KubeScaleClient, ManifestSource,
    ScheduleCache, ScheduleReconciler, Scaler, SystemClock, TracingRecorder,
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Capacity of the watch event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for tasks to stop after the shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the log level can fall back to it
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting kube-start-stop schedule controller");
    info!(
        workers = config.workers,
        resync_interval_secs = config.resync_interval.as_secs(),
        relist_interval_secs = config.relist_interval.as_secs(),
        schedules_path = %config.schedules_path.display(),
        dry_run = config.dry_run(),
        "Configuration loaded"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create the scaler (in-memory when no API server is configured)
    let scaler: Arc<dyn Scaler> = match &config.api_server {
        Some(api_server) => {
            let token = config.read_token()?;
            info!(api_server = %api_server, "Scaling through the API server");
            Arc::new(KubeScaleClient::new(
                api_server,
                token.as_deref(),
                config.scale_timeout,
            )?)
        }
        None => {
            warn!("KSS_API_SERVER not set, running in dry-run mode");
            Arc::new(InMemoryScaler::new())
        }
    };

    let cache = Arc::new(ScheduleCache::new());
    let informer = Informer::new(
        Arc::new(ManifestSource::new(config.schedules_path.clone())),
        Arc::clone(&cache),
        config.relist_interval,
    );

    let reconciler = Arc::new(ScheduleReconciler::new(
        cache.clone(),
        scaler,
        Arc::new(TracingRecorder::new("schedule-controller")),
        Arc::new(SystemClock),
    ));
    let controller = Arc::new(Controller::new(
        reconciler,
        cache.clone(),
        config.controller_config(),
    ));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    // Start the informer
    let mut informer_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { informer.run(events_tx, shutdown_rx).await }
    });

    // Start the controller
    let mut controller_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { controller.run(events_rx, shutdown_rx).await }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut controller_handle => {
            match result {
                Ok(Ok(())) => info!("Controller exited"),
                Ok(Err(e)) => error!(error = %e, "Controller error"),
                Err(e) => error!(error = %e, "Controller task panicked"),
            }
        }
        _ = &mut informer_handle => {
            warn!("Informer exited");
        }
    }

    // Signal shutdown to all tasks
    let _ = shutdown_tx.send(true);

    info!("Waiting for tasks to shut down...");
    let join_all = async {
        if !informer_handle.is_finished() {
            let _ = (&mut informer_handle).await;
        }
        if !controller_handle.is_finished() {
            let _ = (&mut controller_handle).await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, join_all).await.is_err() {
        warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Timed out waiting for tasks to stop"
        );
    }

    info!("Schedule controller shutdown complete");
    Ok(())
}
