pub mod completions;
pub mod doctor;
pub mod run;
pub mod validate;

use berth_runtime::{select_provider, ContainerProvider};
use berth_schema::{parse_options_file, RawOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Messages starting with this map to [`EXIT_CONFIG_ERROR`].
pub const CONFIG_ERROR_PREFIX: &str = "configuration error:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn config_error(e: impl std::fmt::Display) -> String {
    format!("{CONFIG_ERROR_PREFIX} {e}")
}

pub fn load_options(path: &Path) -> Result<RawOptions, String> {
    parse_options_file(path).map_err(|e| config_error(format!("{}: {e}", path.display())))
}

pub fn open_provider(name: &str) -> Result<Arc<dyn ContainerProvider>, String> {
    let provider = select_provider(name).map_err(|e| e.to_string())?;
    Ok(Arc::from(provider))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn status_icon(status: &str) -> String {
    use console::Style;
    match status {
        "pass" => Style::new().green().apply_to("✓").to_string(),
        "fail" => Style::new().red().bold().apply_to("✗").to_string(),
        "warn" => Style::new().yellow().apply_to("⚠").to_string(),
        _ => Style::new().dim().apply_to("ℹ").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_map() {
        let val = serde_json::json!({"image": "nginx"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"image\""));
        assert!(result.contains("\"nginx\""));
    }

    #[test]
    fn config_errors_carry_the_prefix() {
        assert!(config_error("bad").starts_with(CONFIG_ERROR_PREFIX));
    }

    #[test]
    fn missing_option_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_options(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.starts_with(CONFIG_ERROR_PREFIX));
        assert!(err.contains("absent.toml"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = open_provider("podman").err().unwrap();
        assert!(err.contains("podman"));
        assert!(open_provider("mock").is_ok());
    }

    #[test]
    fn status_icon_keeps_symbol() {
        assert!(status_icon("pass").contains('✓'));
        assert!(status_icon("fail").contains('✗'));
        assert!(status_icon("warn").contains('⚠'));
        assert!(status_icon("info").contains('ℹ'));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("starting...");
        spin_ok(&pb, "ready");
        assert!(pb.is_finished());
    }
}
