use super::{describe, json_pretty, load_engine, load_spec, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
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

    let pb = spinner(&format!("pulling {}…", spec.image));
    engine
        .pull(&spec, &CancellationToken::new())
        .await
        .map_err(|e| {
            spin_fail(&pb, "pull failed");
            describe(&e)
        })?;
    spin_ok(&pb, &format!("pulled {}", spec.image));

    if json {
        let payload = serde_json::json!({ "image": spec.image, "pulled": true });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
