//! Run command - serve location requests until Ctrl-C.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner, GlobalOptions};

/// Run the run command.
pub fn run(options: &GlobalOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("run");
    let runtime = runner.runtime()?;

    let shutdown = CancellationToken::new();
    cancel_on_ctrlc(&shutdown)?;

    runtime.block_on(serve(&runner, &shutdown))
}

async fn serve(runner: &CliRunner, shutdown: &CancellationToken) -> Result<(), CliError> {
    let (handle, task) = runner.start_service(shutdown).await?;

    let providers = handle.providers().await?;
    for provider in &providers {
        info!(
            provider = %provider.name,
            service = %provider.service,
            status = %provider.status,
            "Provider registered"
        );
    }
    println!(
        "Geomaster running with {} provider(s). Press Ctrl-C to stop.",
        providers.len()
    );

    shutdown.cancelled().await;
    drop(handle);

    if let Err(e) = task.await {
        warn!(error = %e, "Master service task failed");
    }
    info!("Geomaster stopped");
    Ok(())
}
