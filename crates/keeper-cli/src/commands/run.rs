use super::{describe, exit_status, load_engine, load_spec};
use keeper_core::{install_signal_handler, RunOptions};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Container output goes to stdout/stderr, so `run` has no JSON report.
pub async fn run(
    config_path: Option<&Path>,
    driver: Option<&str>,
    spec_path: &Path,
    options: &RunOptions,
) -> Result<u8, String> {
    let spec = load_spec(spec_path)?;
    let engine = load_engine(config_path, driver).await?;

    let shutdown = CancellationToken::new();
    install_signal_handler(shutdown.clone());

    let code = engine
        .run(
            &spec,
            options,
            tokio::io::stdout(),
            tokio::io::stderr(),
            &shutdown,
        )
        .await
        .map_err(|e| describe(&e))?;

    if shutdown.is_cancelled() {
        info!("run of {} interrupted", spec.name);
    }
    Ok(exit_status(code))
}
