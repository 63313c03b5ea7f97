use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancel `shutdown` on the first SIGINT or SIGTERM; exit the process with
/// status 1 on the second.
///
/// Must be called from within a tokio runtime.
pub fn install_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut requested = false;
        loop {
            if let Err(e) = next_signal().await {
                warn!("failed to listen for signals: {e}");
                return;
            }
            if requested {
                std::process::exit(1);
            }
            requested = true;
            eprintln!("\nshutdown requested, stopping container...");
            shutdown.cancel();
        }
    });
}

#[cfg(unix)]
async fn next_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
