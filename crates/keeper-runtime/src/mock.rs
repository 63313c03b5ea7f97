use crate::driver::{ContainerRecord, ContainerStatus, CreateRequest, Driver, LogSink};
use crate::RuntimeError;
use async_trait::async_trait;
use keeper_schema::ContainerId;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Exit code a mock container reports after being stopped (128 + SIGTERM).
const STOPPED_EXIT_CODE: i64 = 143;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MockConfig {
    /// Exit code a running container exits with as soon as it is waited on.
    /// `None` keeps it running until stopped.
    #[serde(default)]
    pub exit_code: Option<i64>,
    /// Lines written to stdout the first time logs are streamed for a container.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Operation names that fail with an injected error
    /// (`pull`, `find`, `status`, `create`, `start`, `stop`, `remove`, `wait`, `logs`).
    #[serde(default)]
    pub fail_on: Vec<String>,
    /// Operation names that hang until their cancellation token fires.
    #[serde(default)]
    pub block_on: Vec<String>,
}

/// One recorded driver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Pull(String),
    Find(String),
    Status(ContainerId),
    Create(CreateRequest),
    Start(ContainerId),
    Stop(ContainerId),
    Remove(ContainerId),
    Wait(ContainerId),
    Logs(ContainerId),
}

impl MockCall {
    /// True for calls that change backend state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            MockCall::Create(_) | MockCall::Start(_) | MockCall::Stop(_) | MockCall::Remove(_)
        )
    }

    pub fn op(&self) -> &'static str {
        match self {
            MockCall::Pull(_) => "pull",
            MockCall::Find(_) => "find",
            MockCall::Status(_) => "status",
            MockCall::Create(_) => "create",
            MockCall::Start(_) => "start",
            MockCall::Stop(_) => "stop",
            MockCall::Remove(_) => "remove",
            MockCall::Wait(_) => "wait",
            MockCall::Logs(_) => "logs",
        }
    }
}

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    labels: BTreeMap<String, String>,
    status: ContainerStatus,
    exit_code: i64,
}

#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    next_id: u64,
    calls: Vec<MockCall>,
    logs_emitted: BTreeSet<String>,
}

/// In-memory backend that journals every call.
pub struct MockDriver {
    config: MockConfig,
    state: Mutex<MockState>,
    changed: Notify,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::with_config(MockConfig::default())
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MockState::default()),
            changed: Notify::new(),
        }
    }

    pub fn from_json(config: Option<&serde_json::Value>) -> Result<Self, RuntimeError> {
        let config = match config {
            Some(value) => MockConfig::deserialize(value).map_err(|e| {
                RuntimeError::InvalidConfig {
                    driver: "mock".to_owned(),
                    reason: e.to_string(),
                }
            })?,
            None => MockConfig::default(),
        };
        Ok(Self::with_config(config))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn record(&self, call: MockCall, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        let op = call.op();
        self.lock().calls.push(call);
        if self.config.block_on.iter().any(|b| b == op) {
            cancel.cancelled().await;
            return Err(RuntimeError::Cancelled);
        }
        if self.config.fail_on.iter().any(|f| f == op) {
            return Err(RuntimeError::CommandFailed {
                command: format!("mock {op}"),
                code: 1,
                stderr: "injected failure".to_owned(),
            });
        }
        Ok(())
    }

    fn allocate_id(state: &mut MockState) -> ContainerId {
        state.next_id += 1;
        ContainerId::new(format!("{:064x}", state.next_id))
    }

    /// Seed a record directly, bypassing name-conflict checks and the call journal.
    pub fn insert_container(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        status: ContainerStatus,
    ) -> ContainerId {
        let mut state = self.lock();
        let id = Self::allocate_id(&mut state);
        state.containers.insert(
            id.to_string(),
            MockContainer {
                name: name.to_owned(),
                labels,
                status,
                exit_code: 0,
            },
        );
        id
    }

    /// Simulate the container's process exiting on its own.
    pub fn exit(&self, id: &ContainerId, code: i64) {
        if let Some(c) = self.lock().containers.get_mut(id.as_str()) {
            c.status = ContainerStatus::Stopped;
            c.exit_code = code;
        }
        self.changed.notify_waiters();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<MockCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn record_of(&self, id: &ContainerId) -> Option<ContainerRecord> {
        self.lock()
            .containers
            .get(id.as_str())
            .map(|c| to_record(id.as_str(), c))
    }

    pub fn records(&self) -> Vec<ContainerRecord> {
        self.lock()
            .containers
            .iter()
            .map(|(id, c)| to_record(id, c))
            .collect()
    }

    /// Wait for a state change or cancellation after `check` returns `None`.
    async fn wait_until<T>(
        &self,
        cancel: &CancellationToken,
        mut check: impl FnMut(&mut MockState) -> Option<Result<T, RuntimeError>> + Send,
    ) -> Result<T, RuntimeError> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let outcome = check(&mut self.lock());
            if let Some(result) = outcome {
                return result;
            }

            tokio::select! {
                () = &mut notified => {}
                () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            }
        }
    }
}

fn to_record(id: &str, c: &MockContainer) -> ContainerRecord {
    ContainerRecord {
        id: ContainerId::new(id),
        status: c.status,
        labels: c.labels.clone(),
        exit_code: c.exit_code,
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn pull_image(
        &self,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.record(MockCall::Pull(image.to_owned()), cancel).await
    }

    async fn find_container(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerRecord>, RuntimeError> {
        self.record(MockCall::Find(name.to_owned()), cancel).await?;
        let state = self.lock();
        let matches: Vec<ContainerRecord> = state
            .containers
            .iter()
            .filter(|(_, c)| {
                c.name == name && labels.iter().all(|(k, v)| c.labels.get(k) == Some(v))
            })
            .map(|(id, c)| to_record(id, c))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            count => Err(RuntimeError::AmbiguousContainer {
                name: name.to_owned(),
                count,
            }),
        }
    }

    async fn container_status(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<ContainerRecord, RuntimeError> {
        self.record(MockCall::Status(id.clone()), cancel).await?;
        self.record_of(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))
    }

    async fn create_container(
        &self,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<ContainerId, RuntimeError> {
        self.record(MockCall::Create(request.clone()), cancel).await?;
        let mut state = self.lock();
        if state.containers.values().any(|c| c.name == request.name) {
            return Err(RuntimeError::NameConflict(request.name.clone()));
        }
        let id = Self::allocate_id(&mut state);
        state.containers.insert(
            id.to_string(),
            MockContainer {
                name: request.name.clone(),
                labels: request.labels.clone(),
                status: ContainerStatus::Created,
                exit_code: 0,
            },
        );
        Ok(id)
    }

    async fn start_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.record(MockCall::Start(id.clone()), cancel).await?;
        {
            let mut state = self.lock();
            let c = state
                .containers
                .get_mut(id.as_str())
                .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
            c.status = ContainerStatus::Running;
            c.exit_code = 0;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.record(MockCall::Stop(id.clone()), cancel).await?;
        {
            let mut state = self.lock();
            let c = state
                .containers
                .get_mut(id.as_str())
                .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
            if c.status == ContainerStatus::Running {
                c.status = ContainerStatus::Stopped;
                c.exit_code = STOPPED_EXIT_CODE;
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.record(MockCall::Remove(id.clone()), cancel).await?;
        self.lock().containers.remove(id.as_str());
        self.changed.notify_waiters();
        Ok(())
    }

    async fn wait_for_exit(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.record(MockCall::Wait(id.clone()), cancel).await?;
        let exit_code = self.config.exit_code;
        let result = self
            .wait_until(cancel, |state| {
                let Some(c) = state.containers.get_mut(id.as_str()) else {
                    return Some(Err(RuntimeError::ContainerNotFound(id.to_string())));
                };
                if c.status != ContainerStatus::Running {
                    return Some(Ok(()));
                }
                if let Some(code) = exit_code {
                    c.status = ContainerStatus::Stopped;
                    c.exit_code = code;
                    return Some(Ok(()));
                }
                None
            })
            .await;
        self.changed.notify_waiters();
        result
    }

    async fn stream_logs(
        &self,
        id: &ContainerId,
        stdout: &mut LogSink,
        _stderr: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.record(MockCall::Logs(id.clone()), cancel).await?;

        let first_attach = self.lock().logs_emitted.insert(id.to_string());
        if first_attach {
            for line in &self.config.logs {
                stdout.write_all(line.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            stdout.flush().await?;
        }

        self.wait_until(cancel, |state| match state.containers.get(id.as_str()) {
            Some(c) if c.status == ContainerStatus::Running => None,
            _ => Some(Ok(())),
        })
        .await
    }
}
