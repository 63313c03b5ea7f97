pub mod completions;
pub mod drivers;
pub mod man_pages;
pub mod pull;
pub mod rm;
pub mod run;
pub mod status;
pub mod stop;

use crate::config::KeeperConfig;
use indicatif::{ProgressBar, ProgressStyle};
use keeper_core::{CoreError, Engine};
use keeper_runtime::DriverRegistry;
use keeper_schema::{parse_spec_file, ContainerSpec};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_SPEC_ERROR: u8 = 2;
pub const EXIT_DRIVER_ERROR: u8 = 3;
pub const EXIT_NOT_FOUND: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "running" => Style::new().green().bold().apply_to(status).to_string(),
        "created" => Style::new().yellow().apply_to(status).to_string(),
        "stopped" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

pub fn load_spec(path: &Path) -> Result<ContainerSpec, String> {
    parse_spec_file(path).map_err(|e| format!("spec error: {}: {e}", path.display()))
}

/// Render a core error with the prefix `main` uses to pick the exit code.
pub fn describe(err: &CoreError) -> String {
    match err {
        CoreError::Driver { .. } | CoreError::Ambiguous { .. } | CoreError::Timeout { .. } => {
            format!("driver error: {err}")
        }
        CoreError::Spec(_) | CoreError::Config(_) => err.to_string(),
    }
}

pub fn not_found(name: &str) -> u8 {
    eprintln!("container not found: {name}");
    EXIT_NOT_FOUND
}

/// Map a container exit code onto a process exit status.
pub fn exit_status(code: i64) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}

/// Resolve the active driver from flags and config, then provision it.
pub async fn load_engine(config_path: Option<&Path>, requested: Option<&str>) -> Result<Engine, String> {
    let config = KeeperConfig::load_or_default(config_path).map_err(|e| describe(&e))?;
    let (id, driver_config) = config.select_driver(requested).map_err(|e| describe(&e))?;
    let driver = DriverRegistry::builtin()
        .load(id, driver_config, &CancellationToken::new())
        .await
        .map_err(|e| format!("driver error: {e}"))?;
    Ok(Engine::new(driver))
}
