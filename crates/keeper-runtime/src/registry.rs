use crate::driver::Driver;
use crate::engine::{EngineCliDriver, EngineFlavor};
use crate::mock::MockDriver;
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builds a driver from its optional backend-specific JSON configuration.
pub type DriverFactory = fn(Option<&serde_json::Value>) -> Result<Arc<dyn Driver>, RuntimeError>;

/// Mapping from backend identifier to driver factory.
///
/// Built once at startup and then only read; there is no process-wide
/// instance, callers own the registry and pass it where drivers are loaded.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every backend shipped with keeper.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(EngineFlavor::Docker.id(), docker_factory);
        registry.register(EngineFlavor::Podman.id(), podman_factory);
        registry.register(EngineFlavor::Nerdctl.id(), nerdctl_factory);
        registry.register("mock", mock_factory);
        registry
    }

    /// Register a backend.
    ///
    /// # Panics
    ///
    /// Panics if `id` is empty or already registered; both are programming
    /// errors in the startup wiring.
    pub fn register(&mut self, id: &str, factory: DriverFactory) {
        assert!(!id.is_empty(), "driver id must not be empty");
        assert!(
            !self.factories.contains_key(id),
            "driver already registered: {id}"
        );
        self.factories.insert(id.to_owned(), factory);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct a driver without provisioning it.
    pub fn construct(
        &self,
        id: &str,
        config: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn Driver>, RuntimeError> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownDriver(id.to_owned()))?;
        factory(config)
    }

    /// Construct and provision a driver, ready for use.
    pub async fn load(
        &self,
        id: &str,
        config: Option<&serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Driver>, RuntimeError> {
        let driver = self.construct(id, config)?;
        debug!("provisioning driver {id}");
        driver.provision(cancel).await?;
        Ok(driver)
    }
}

fn docker_factory(config: Option<&serde_json::Value>) -> Result<Arc<dyn Driver>, RuntimeError> {
    Ok(Arc::new(EngineCliDriver::from_json(
        EngineFlavor::Docker,
        config,
    )?))
}

fn podman_factory(config: Option<&serde_json::Value>) -> Result<Arc<dyn Driver>, RuntimeError> {
    Ok(Arc::new(EngineCliDriver::from_json(
        EngineFlavor::Podman,
        config,
    )?))
}

fn nerdctl_factory(config: Option<&serde_json::Value>) -> Result<Arc<dyn Driver>, RuntimeError> {
    Ok(Arc::new(EngineCliDriver::from_json(
        EngineFlavor::Nerdctl,
        config,
    )?))
}

fn mock_factory(config: Option<&serde_json::Value>) -> Result<Arc<dyn Driver>, RuntimeError> {
    Ok(Arc::new(MockDriver::from_json(config)?))
}
