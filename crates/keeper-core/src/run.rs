use crate::reconcile::reconcile;
use crate::teardown::{final_status, stop_and_cleanup};
use crate::CoreError;
use keeper_runtime::{Driver, LogSink};
use keeper_schema::{ContainerId, ContainerSpec};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Limit for each stop, remove and final status call.
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before re-attaching to the log stream after it ended.
pub const LOG_REATTACH_DELAY: Duration = Duration::from_secs(1);

/// How long the log stream may keep draining after the container exited.
const LOG_DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Remove the container when the run is cancelled.
    pub cleanup: bool,
    /// Pull the image before reconciling.
    pub pull: bool,
    pub teardown_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cleanup: true,
            pull: false,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }
}

/// First error raised by either unit of a run. Recording it cancels the
/// shared scope so the other unit unwinds.
struct FirstFailure {
    slot: Mutex<Option<CoreError>>,
    scope: CancellationToken,
}

impl FirstFailure {
    fn new(scope: CancellationToken) -> Self {
        Self {
            slot: Mutex::new(None),
            scope,
        }
    }

    fn record(&self, err: CoreError) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            debug!("run failed: {err}");
            *slot = Some(err);
        }
        self.scope.cancel();
    }

    fn into_result(self, exit_code: i64) -> Result<i64, CoreError> {
        match self.slot.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(err) => Err(err),
            None => Ok(exit_code),
        }
    }
}

/// Run `spec` to completion and return the container's exit code.
///
/// Two units share one cancellation scope derived from `shutdown`. The
/// lifecycle unit reconciles, hands the container id to the log unit, and
/// waits for the container to exit; when the scope is cancelled instead it
/// stops the container (and removes it if `options.cleanup` is set) within
/// `options.teardown_timeout`. The log unit forwards output to `stdout` and
/// `stderr` until the lifecycle unit winds it down.
///
/// Cancelling `shutdown` is a normal way to end a run and yields `Ok(0)`
/// once teardown succeeds. The first error from either unit cancels the
/// other and becomes the result.
pub async fn run<O, E>(
    driver: &dyn Driver,
    spec: &ContainerSpec,
    options: &RunOptions,
    mut stdout: O,
    mut stderr: E,
    shutdown: &CancellationToken,
) -> Result<i64, CoreError>
where
    O: AsyncWrite + Send + Unpin + 'static,
    E: AsyncWrite + Send + Unpin + 'static,
{
    if options.pull {
        info!("pulling image {}", spec.image);
        match driver.pull_image(&spec.image, shutdown).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                warn!("run of {} cancelled while pulling {}", spec.name, spec.image);
                return Ok(0);
            }
            Err(e) => return Err(CoreError::driver("pull image", e)),
        }
    }

    let scope = shutdown.child_token();
    let wind_down = scope.child_token();
    let failure = FirstFailure::new(scope.clone());
    let (id_tx, id_rx) = oneshot::channel();

    let lifecycle = async {
        match supervise(driver, spec, options, id_tx, &scope, &wind_down).await {
            Ok(code) => code,
            Err(e) => {
                failure.record(e);
                0
            }
        }
    };
    let logs = async {
        if let Err(e) = forward_logs(driver, id_rx, &scope, &wind_down, &mut stdout, &mut stderr).await {
            failure.record(e);
        }
    };

    let (exit_code, ()) = tokio::join!(lifecycle, logs);
    failure.into_result(exit_code)
}

async fn supervise(
    driver: &dyn Driver,
    spec: &ContainerSpec,
    options: &RunOptions,
    id_tx: oneshot::Sender<ContainerId>,
    scope: &CancellationToken,
    wind_down: &CancellationToken,
) -> Result<i64, CoreError> {
    let id = match reconcile(driver, spec, scope).await {
        Ok(reconciled) => reconciled.id,
        Err(e) if e.is_cancelled() => {
            warn!("run of {} cancelled before the container was started", spec.name);
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    // The log unit may already be gone if the scope ended.
    let _ = id_tx.send(id.clone());

    loop {
        if scope.is_cancelled() {
            stop_and_cleanup(driver, &id, options.cleanup, options.teardown_timeout).await?;
            return Ok(0);
        }
        match driver.wait_for_exit(&id, scope).await {
            Ok(()) => break,
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(CoreError::driver("wait for exit", e)),
        }
    }

    wind_down.cancel();
    let record = final_status(driver, &id, options.teardown_timeout).await?;
    info!("container {} exited with code {}", id.short(), record.exit_code);
    Ok(record.exit_code)
}

async fn forward_logs(
    driver: &dyn Driver,
    id_rx: oneshot::Receiver<ContainerId>,
    scope: &CancellationToken,
    wind_down: &CancellationToken,
    stdout: &mut LogSink,
    stderr: &mut LogSink,
) -> Result<(), CoreError> {
    let id = tokio::select! {
        biased;
        received = id_rx => match received {
            Ok(id) => id,
            Err(_) => return Ok(()),
        },
        () = wind_down.cancelled() => return Ok(()),
    };
    debug!("forwarding logs of container {}", id.short());

    loop {
        // Once the container has exited its stream ends on its own; the
        // grace period only bounds how long the tail may take to drain.
        let result = tokio::select! {
            result = driver.stream_logs(&id, stdout, stderr, scope) => result,
            () = drain_deadline(wind_down) => return Ok(()),
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => return Err(CoreError::driver("stream logs", e)),
        }

        tokio::select! {
            () = tokio::time::sleep(LOG_REATTACH_DELAY) => {}
            () = wind_down.cancelled() => return Ok(()),
        }
    }
}

async fn drain_deadline(wind_down: &CancellationToken) {
    wind_down.cancelled().await;
    tokio::time::sleep(LOG_DRAIN_GRACE).await;
}
