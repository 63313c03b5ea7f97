use super::{describe, json_pretty, EXIT_SUCCESS};
use crate::config::KeeperConfig;
use keeper_runtime::DriverRegistry;
use std::path::Path;

pub fn run(config_path: Option<&Path>, json: bool) -> Result<u8, String> {
    let config = KeeperConfig::load_or_default(config_path).map_err(|e| describe(&e))?;
    let registry = DriverRegistry::builtin();

    if json {
        let drivers: Vec<_> = registry
            .ids()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "configured": config.driver.contains_key(id),
                })
            })
            .collect();
        println!("{}", json_pretty(&drivers)?);
    } else {
        for id in registry.ids() {
            let marker = if config.driver.contains_key(id) {
                " (configured)"
            } else {
                ""
            };
            println!("{id}{marker}");
        }
    }
    Ok(EXIT_SUCCESS)
}
