use super::{config_error, json_pretty, load_options, EXIT_SUCCESS};
use berth_schema::{container_schema, validate, ContainerConfig, ResolvedConfig};
use std::path::Path;

pub fn run(config: &Path, json_output: bool) -> Result<u8, String> {
    let resolved = resolve(config)?;
    if json_output {
        println!("{}", json_pretty(&resolved)?);
    } else {
        print!("{}", render(&resolved));
    }
    Ok(EXIT_SUCCESS)
}

/// Load, validate and type-check the option file.
pub fn resolve(config: &Path) -> Result<ResolvedConfig, String> {
    let raw = load_options(config)?;
    let schema = container_schema().map_err(config_error)?;
    let resolved = validate(&schema, &raw).map_err(config_error)?;
    ContainerConfig::from_resolved(&resolved).map_err(config_error)?;
    Ok(resolved)
}

fn render(resolved: &ResolvedConfig) -> String {
    let width = resolved.keys().map(str::len).max().unwrap_or(0);
    resolved
        .iter()
        .map(|(key, value)| format!("{key:<width$} = {value}\n"))
        .collect()
}
