use keeper_core::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Contents of `~/.config/keeper/config.json`.
///
/// Each key under `driver` names a backend; its value is handed to that
/// backend's factory untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeeperConfig {
    #[serde(default)]
    pub driver: BTreeMap<String, serde_json::Value>,
}

impl KeeperConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Load an explicit `path`, or the default file if it exists.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, CoreError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Pick the active driver and its configuration.
    ///
    /// An explicit request wins. Otherwise the single configured driver is
    /// used; there is no built-in default.
    pub fn select_driver<'a>(
        &'a self,
        requested: Option<&'a str>,
    ) -> Result<(&'a str, Option<&'a serde_json::Value>), CoreError> {
        if let Some(id) = requested {
            return Ok((id, self.driver.get(id)));
        }
        let mut configured = self.driver.iter();
        match (configured.next(), configured.next()) {
            (Some((id, config)), None) => Ok((id.as_str(), Some(config))),
            (None, _) => Err(CoreError::Config(
                "no driver selected: pass --driver, set KEEPER_DRIVER, or configure one".to_owned(),
            )),
            (Some(_), Some(_)) => Err(CoreError::Config(format!(
                "several drivers configured ({}); pick one with --driver",
                self.driver.keys().cloned().collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/keeper/config.json"))
}
