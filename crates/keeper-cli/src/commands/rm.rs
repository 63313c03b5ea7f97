use super::{describe, json_pretty, load_engine, load_spec, not_found, EXIT_SUCCESS};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn run(
    config_path: Option<&Path>,
    driver: Option<&str>,
    spec_path: &Path,
    json: bool,
) -> Result<u8, String> {
    let spec = load_spec(spec_path)?;
    let engine = load_engine(config_path, driver).await?;
    let Some(id) = engine
        .remove(&spec.name, &CancellationToken::new())
        .await
        .map_err(|e| describe(&e))?
    else {
        return Ok(not_found(&spec.name));
    };

    if json {
        let payload = serde_json::json!({ "name": spec.name, "id": id, "removed": true });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("removed container {} ({})", spec.name, id.short());
    }
    Ok(EXIT_SUCCESS)
}
