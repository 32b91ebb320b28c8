use mailgate_core::services::metrics::MetricsService as _;
use mailgate_worker::scheduler::Worker;
use mailgate_worker::{WorkerContext, sweeper};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Mailgate worker");

    let ctx = Arc::new(WorkerContext::from_env().await?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let aws_config = aws_config::load_from_env().await;
    let verifier: Arc<dyn mailgate_core::services::domains::DomainVerifier> = Arc::new(
        mailgate_core::services::domains::SesDomainVerifier::new(aws_sdk_ses::Client::new(
            &aws_config,
        )),
    );
    let sweeper_handle = tokio::spawn(sweeper::run(
        ctx.clone(),
        Some(verifier),
        shutdown_rx.clone(),
    ));

    let mut worker = Worker::new(ctx.clone(), shutdown_rx);
    let worker_handle = tokio::spawn(async move { worker.run().await });

    // graceful shutdown: stop the claim loop first, then wait for the
    // drain window inside Worker::run
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown_tx.send(true)?;

    worker_handle.await?;
    sweeper_handle.await?;
    ctx.metrics.flush().await;
    info!("Worker stopped");
    Ok(())
}
