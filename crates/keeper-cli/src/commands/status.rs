use super::{colorize_status, describe, json_pretty, load_engine, load_spec, not_found, EXIT_SUCCESS};
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
    let Some(state) = engine
        .status(&spec.name, &CancellationToken::new())
        .await
        .map_err(|e| describe(&e))?
    else {
        return Ok(not_found(&spec.name));
    };

    if json {
        println!("{}", json_pretty(&state)?);
    } else {
        println!("name:         {}", spec.name);
        println!("id:           {}", state.id);
        println!("status:       {}", colorize_status(&state.status));
        println!("fingerprint:  {}", state.fingerprint);
        if let Some(code) = state.exit_code {
            println!("exit code:    {code}");
        }
    }
    Ok(EXIT_SUCCESS)
}
