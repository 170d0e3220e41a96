use crate::validate::RawOptions;
use crate::SchemaError;
use std::fs;
use std::path::Path;

/// Parse options from a TOML document whose top-level keys are option names.
pub fn parse_options_str(input: &str) -> Result<RawOptions, SchemaError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_options_json(input: &str) -> Result<RawOptions, SchemaError> {
    Ok(serde_json::from_str(input)?)
}

/// Read an option file; `.json` files are parsed as JSON, anything else as TOML.
pub fn parse_options_file(path: impl AsRef<Path>) -> Result<RawOptions, SchemaError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        parse_options_json(&content)
    } else {
        parse_options_str(&content)
    }
}
