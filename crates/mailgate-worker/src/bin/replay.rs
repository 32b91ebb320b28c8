//! DLQ replay tool
//!
//! Selection comes from the environment: REPLAY_JOB_ID, REPLAY_COMPANY_ID,
//! REPLAY_ERROR_CODE, REPLAY_LIMIT, REPLAY_DELAY_MS.
use mailgate_worker::WorkerContext;
use mailgate_worker::replay::{ReplayOptions, replay};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let ctx = WorkerContext::from_env().await?;
    let options = ReplayOptions::from_env()?;
    info!(?options, "Starting DLQ replay");

    let report = replay(&ctx, &options).await?;
    info!(
        replayed = report.replayed,
        skipped = report.skipped,
        failed = report.failed,
        aborted = report.aborted,
        "Replay done"
    );
    if report.aborted {
        std::process::exit(2);
    }
    Ok(())
}
