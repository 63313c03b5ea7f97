use crate::driver::{ContainerRecord, ContainerStatus, CreateRequest, Driver, LogSink};
use crate::RuntimeError;
use async_trait::async_trait;
use keeper_schema::ContainerId;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Docker-compatible engine command-line tools keeper can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFlavor {
    Docker,
    Podman,
    Nerdctl,
}

impl EngineFlavor {
    pub fn id(self) -> &'static str {
        match self {
            EngineFlavor::Docker => "docker",
            EngineFlavor::Podman => "podman",
            EngineFlavor::Nerdctl => "nerdctl",
        }
    }

    fn default_global_args(self) -> Vec<String> {
        match self {
            EngineFlavor::Nerdctl => vec!["--namespace".to_owned(), "keeper".to_owned()],
            EngineFlavor::Docker | EngineFlavor::Podman => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineCliConfig {
    /// Executable to invoke; defaults to the flavor's name on `PATH`.
    #[serde(default)]
    pub binary: Option<String>,
    /// Arguments placed before every subcommand (e.g. `-H`, `--namespace`).
    #[serde(default)]
    pub global_args: Option<Vec<String>>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Driver that shells out to a docker-compatible CLI.
pub struct EngineCliDriver {
    flavor: EngineFlavor,
    binary: String,
    global_args: Vec<String>,
    network: String,
    /// Per-container end time of the last log stream, used as `--since` on re-attach.
    log_cursors: Mutex<HashMap<String, String>>,
}

impl EngineCliDriver {
    pub fn new(flavor: EngineFlavor, config: EngineCliConfig) -> Self {
        Self {
            flavor,
            binary: config.binary.unwrap_or_else(|| flavor.id().to_owned()),
            global_args: config
                .global_args
                .unwrap_or_else(|| flavor.default_global_args()),
            network: config.network.unwrap_or_else(|| "host".to_owned()),
            log_cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_json(
        flavor: EngineFlavor,
        config: Option<&serde_json::Value>,
    ) -> Result<Self, RuntimeError> {
        let config = match config {
            Some(value) => EngineCliConfig::deserialize(value).map_err(|e| {
                RuntimeError::InvalidConfig {
                    driver: flavor.id().to_owned(),
                    reason: e.to_string(),
                }
            })?,
            None => EngineCliConfig::default(),
        };
        Ok(Self::new(flavor, config))
    }

    fn cursors(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.log_cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.global_args)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> RuntimeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::BackendUnavailable(format!("{} not found on PATH", self.binary))
        } else {
            RuntimeError::Io(e)
        }
    }

    fn describe(&self, args: &[String]) -> String {
        let sub: Vec<&str> = args.iter().take(2).map(String::as_str).collect();
        format!("{} {}", self.binary, sub.join(" "))
    }

    /// Run one CLI invocation to completion and return its trimmed stdout.
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<String, RuntimeError> {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        debug!("{} {}", self.binary, args.join(" "));

        let child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let output = tokio::select! {
            out = child.wait_with_output() => out?,
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
        };

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: self.describe(args),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}

/// Anchored name filter; names only allow `[A-Za-z0-9_.-]`, so `.` is the
/// only character needing an escape.
pub(crate) fn find_args(name: &str, labels: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = to_args(&["container", "ls", "--all", "--quiet", "--no-trunc"]);
    args.push("--filter".to_owned());
    args.push(format!("name=^/?{}$", name.replace('.', "\\.")));
    for (k, v) in labels {
        args.push("--filter".to_owned());
        args.push(format!("label={k}={v}"));
    }
    args
}

pub(crate) fn create_args(request: &CreateRequest, network: &str) -> Vec<String> {
    let mut args = to_args(&["container", "create", "--name"]);
    args.push(request.name.clone());
    args.push("--network".to_owned());
    args.push(network.to_owned());

    for (k, v) in &request.labels {
        args.push("--label".to_owned());
        args.push(format!("{k}={v}"));
    }
    for (k, v) in &request.environment {
        args.push("--env".to_owned());
        args.push(format!("{k}={v}"));
    }
    for volume in &request.volumes {
        let mut mount = format!("type=bind,source={},target={}", volume.source, volume.target);
        if volume.read_only {
            mount.push_str(",readonly");
        }
        args.push("--mount".to_owned());
        args.push(mount);
    }

    // The CLI entrypoint flag takes a single executable; any further command
    // tokens lead the positional arguments.
    let mut command = request.command.iter();
    if let Some(entrypoint) = command.next() {
        args.push("--entrypoint".to_owned());
        args.push(entrypoint.clone());
    }
    args.push(request.image.clone());
    args.extend(command.cloned());
    args.extend(request.arguments.iter().cloned());
    args
}

pub(crate) fn map_status(status: &str) -> Result<ContainerStatus, RuntimeError> {
    match status {
        "created" | "configured" | "initialized" => Ok(ContainerStatus::Created),
        "running" | "paused" | "restarting" => Ok(ContainerStatus::Running),
        "exited" | "dead" | "removing" | "stopped" => Ok(ContainerStatus::Stopped),
        other => Err(RuntimeError::UnknownStatus(other.to_owned())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    state: InspectState,
    #[serde(default)]
    config: Option<InspectConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    exit_code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

pub(crate) fn parse_inspect(output: &str, id: &ContainerId) -> Result<ContainerRecord, RuntimeError> {
    let entries: Vec<InspectEntry> = serde_json::from_str(output)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
    let status = map_status(&entry.state.status)?;
    Ok(ContainerRecord {
        id: ContainerId::new(entry.id),
        status,
        labels: entry.config.and_then(|c| c.labels).unwrap_or_default(),
        exit_code: if status == ContainerStatus::Stopped {
            entry.state.exit_code
        } else {
            0
        },
    })
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("not found")
}

#[async_trait]
impl Driver for EngineCliDriver {
    fn name(&self) -> &str {
        self.flavor.id()
    }

    async fn provision(&self, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        match self.run(&to_args(&["version"]), cancel).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::CommandFailed { stderr, .. }) => Err(
                RuntimeError::BackendUnavailable(format!("{} is not reachable: {stderr}", self.binary)),
            ),
            Err(e) => Err(e),
        }
    }

    async fn pull_image(&self, image: &str, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        let output = self
            .run(&to_args(&["image", "pull", image]), cancel)
            .await?;
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            debug!(image, "{line}");
        }
        info!("pulled image {image}");
        Ok(())
    }

    async fn find_container(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerRecord>, RuntimeError> {
        let output = self.run(&find_args(name, labels), cancel).await?;
        let ids: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        match ids.as_slice() {
            [] => Ok(None),
            [id] => self
                .container_status(&ContainerId::new(*id), cancel)
                .await
                .map(Some),
            _ => Err(RuntimeError::AmbiguousContainer {
                name: name.to_owned(),
                count: ids.len(),
            }),
        }
    }

    async fn container_status(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<ContainerRecord, RuntimeError> {
        let output = self
            .run(&to_args(&["container", "inspect", id.as_str()]), cancel)
            .await?;
        parse_inspect(&output, id)
    }

    async fn create_container(
        &self,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<ContainerId, RuntimeError> {
        let output = self.run(&create_args(request, &self.network), cancel).await?;
        // Pull progress may precede the id when the engine fetches a missing image.
        let id = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| RuntimeError::CommandFailed {
                command: format!("{} container create", self.binary),
                code: 0,
                stderr: "no container id in output".to_owned(),
            })?;
        Ok(ContainerId::new(id))
    }

    async fn start_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.run(&to_args(&["container", "start", id.as_str()]), cancel)
            .await
            .map(|_| ())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.run(&to_args(&["container", "stop", id.as_str()]), cancel)
            .await
            .map(|_| ())
    }

    async fn remove_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let result = self
            .run(&to_args(&["container", "rm", "--force", id.as_str()]), cancel)
            .await;
        self.cursors().remove(id.as_str());
        match result {
            Err(RuntimeError::CommandFailed { stderr, .. }) if is_missing_container(&stderr) => {
                debug!("container {} already gone", id.short());
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn wait_for_exit(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.run(&to_args(&["container", "wait", id.as_str()]), cancel)
            .await
            .map(|_| ())
    }

    async fn stream_logs(
        &self,
        id: &ContainerId,
        stdout: &mut LogSink,
        stderr: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let mut args = to_args(&["container", "logs", "--follow"]);
        let since = self.cursors().get(id.as_str()).cloned();
        if let Some(since) = since {
            args.push("--since".to_owned());
            args.push(since);
        }
        args.push(id.to_string());
        debug!("{} {}", self.binary, args.join(" "));

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        let mut out = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("log stdout not captured"))?;
        let mut err = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("log stderr not captured"))?;

        let forward = async {
            tokio::try_join!(
                tokio::io::copy(&mut out, &mut *stdout),
                tokio::io::copy(&mut err, &mut *stderr)
            )?;
            stdout.flush().await?;
            stderr.flush().await?;
            child.wait().await
        };

        let status = tokio::select! {
            status = forward => status?,
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
        };

        self.cursors().insert(id.to_string(), chrono::Utc::now().to_rfc3339());

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("{} container logs", self.binary),
                code: status.code().unwrap_or(-1),
                stderr: format!("log stream for {} ended abnormally", id.short()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_schema::VolumeMount;

    fn request() -> CreateRequest {
        CreateRequest {
            name: "web".to_owned(),
            image: "nginx:1.25".to_owned(),
            labels: BTreeMap::from([("io.keeper.managed".to_owned(), "true".to_owned())]),
            command: Vec::new(),
            arguments: Vec::new(),
            environment: BTreeMap::from([("MODE".to_owned(), "prod".to_owned())]),
            volumes: vec![VolumeMount {
                source: "/srv".to_owned(),
                target: "/data".to_owned(),
                read_only: true,
            }],
        }
    }

    #[test]
    fn create_args_without_command_uses_image_defaults() {
        let args = create_args(&request(), "host");
        assert_eq!(
            args,
            to_args(&[
                "container",
                "create",
                "--name",
                "web",
                "--network",
                "host",
                "--label",
                "io.keeper.managed=true",
                "--env",
                "MODE=prod",
                "--mount",
                "type=bind,source=/srv,target=/data,readonly",
                "nginx:1.25",
            ])
        );
    }

    #[test]
    fn create_args_split_command_into_entrypoint_and_positionals() {
        let mut req = request();
        req.command = to_args(&["/bin/sh", "-c"]);
        req.arguments = to_args(&["echo hi"]);
        let args = create_args(&req, "bridge");
        let image_at = args.iter().position(|a| a == "nginx:1.25").unwrap();
        assert_eq!(args[image_at - 2], "--entrypoint");
        assert_eq!(args[image_at - 1], "/bin/sh");
        assert_eq!(&args[image_at + 1..], &to_args(&["-c", "echo hi"])[..]);
        assert!(args.windows(2).any(|w| w[0] == "--network" && w[1] == "bridge"));
    }

    #[test]
    fn find_args_anchor_and_escape_name() {
        let labels = BTreeMap::from([
            ("io.keeper.managed".to_owned(), "true".to_owned()),
            ("io.keeper.name".to_owned(), "web.v2".to_owned()),
        ]);
        let args = find_args("web.v2", &labels);
        assert!(args.contains(&"name=^/?web\\.v2$".to_owned()));
        assert!(args.contains(&"label=io.keeper.managed=true".to_owned()));
        assert!(args.contains(&"label=io.keeper.name=web.v2".to_owned()));
        assert!(args.contains(&"--all".to_owned()));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_status("created").unwrap(), ContainerStatus::Created);
        assert_eq!(map_status("configured").unwrap(), ContainerStatus::Created);
        assert_eq!(map_status("running").unwrap(), ContainerStatus::Running);
        assert_eq!(map_status("paused").unwrap(), ContainerStatus::Running);
        assert_eq!(map_status("restarting").unwrap(), ContainerStatus::Running);
        assert_eq!(map_status("exited").unwrap(), ContainerStatus::Stopped);
        assert_eq!(map_status("dead").unwrap(), ContainerStatus::Stopped);
        assert_eq!(map_status("stopped").unwrap(), ContainerStatus::Stopped);
        assert!(matches!(
            map_status("frobnicated"),
            Err(RuntimeError::UnknownStatus(_))
        ));
    }

    #[test]
    fn parse_inspect_stopped_container() {
        let output = r#"[{
            "Id": "abc123",
            "State": {"Status": "exited", "ExitCode": 2, "Running": false},
            "Config": {"Labels": {"io.keeper.name": "web"}, "Image": "nginx"}
        }]"#;
        let record = parse_inspect(output, &ContainerId::new("abc")).unwrap();
        assert_eq!(record.id.as_str(), "abc123");
        assert_eq!(record.status, ContainerStatus::Stopped);
        assert_eq!(record.exit_code, 2);
        assert_eq!(record.labels.get("io.keeper.name").unwrap(), "web");
    }

    #[test]
    fn parse_inspect_ignores_exit_code_while_running() {
        let output = r#"[{"Id": "abc", "State": {"Status": "running", "ExitCode": 9}, "Config": {"Labels": null}}]"#;
        let record = parse_inspect(output, &ContainerId::new("abc")).unwrap();
        assert_eq!(record.status, ContainerStatus::Running);
        assert_eq!(record.exit_code, 0);
        assert!(record.labels.is_empty());
    }

    #[test]
    fn parse_inspect_empty_is_not_found() {
        let err = parse_inspect("[]", &ContainerId::new("abc")).unwrap_err();
        assert!(matches!(err, RuntimeError::ContainerNotFound(_)));
    }

    #[test]
    fn flavor_defaults() {
        let docker = EngineCliDriver::new(EngineFlavor::Docker, EngineCliConfig::default());
        assert_eq!(docker.binary, "docker");
        assert!(docker.global_args.is_empty());
        assert_eq!(docker.network, "host");

        let nerdctl = EngineCliDriver::new(EngineFlavor::Nerdctl, EngineCliConfig::default());
        assert_eq!(nerdctl.global_args, to_args(&["--namespace", "keeper"]));
    }

    #[test]
    fn config_overrides_defaults() {
        let config = serde_json::json!({
            "binary": "/usr/local/bin/docker",
            "globalArgs": ["-H", "unix:///run/user/1000/docker.sock"],
            "network": "bridge"
        });
        let driver = EngineCliDriver::from_json(EngineFlavor::Docker, Some(&config)).unwrap();
        assert_eq!(driver.binary, "/usr/local/bin/docker");
        assert_eq!(driver.global_args.len(), 2);
        assert_eq!(driver.network, "bridge");
    }

    #[test]
    fn missing_container_detection() {
        assert!(is_missing_container("Error: No such container: abc"));
        assert!(is_missing_container("Error: no container with name or ID \"abc\" found: not found"));
        assert!(!is_missing_container("permission denied"));
    }

    #[tokio::test]
    async fn missing_binary_is_backend_unavailable() {
        let driver = EngineCliDriver::new(
            EngineFlavor::Docker,
            EngineCliConfig {
                binary: Some("keeper-test-no-such-engine".to_owned()),
                ..EngineCliConfig::default()
            },
        );
        let err = driver
            .provision(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let driver = EngineCliDriver::new(EngineFlavor::Docker, EngineCliConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = driver
            .wait_for_exit(&ContainerId::new("abc"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn remove_clears_log_cursor_even_after_poisoning() {
        let driver = EngineCliDriver::new(
            EngineFlavor::Podman,
            EngineCliConfig {
                binary: Some("keeper-test-no-such-engine".to_owned()),
                ..EngineCliConfig::default()
            },
        );
        driver
            .cursors()
            .insert("abc".to_owned(), "2026-01-01T00:00:00+00:00".to_owned());
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = driver.log_cursors.lock().unwrap();
            panic!("poison the cursor lock");
        }));
        assert!(driver.log_cursors.is_poisoned());

        let err = driver
            .remove_container(&ContainerId::new("abc"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::BackendUnavailable(_)));
        assert!(driver.cursors().is_empty());
    }
}
