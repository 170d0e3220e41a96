use super::{open_provider, status_icon, validate, EXIT_FAILURE, EXIT_SUCCESS};
use berth_runtime::{check_docker_prereqs, format_missing, DockerProvider};
use serde::Serialize;
use std::path::Path;

pub fn run(config: &Path, provider: &str, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_provider(provider, &mut checks, &mut all_pass);
    check_config(config, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_provider(name: &str, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let provider = match open_provider(name) {
        Ok(p) => p,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("provider", &e));
            return;
        }
    };

    if provider.name() != "docker" {
        checks.push(Check::info(
            "provider",
            &format!("Using the '{}' provider", provider.name()),
        ));
        return;
    }

    let docker = DockerProvider::new();
    let missing = check_docker_prereqs(docker.binary());
    if missing.is_empty() {
        checks.push(Check::pass(
            "provider",
            &format!("Docker reachable via '{}'", docker.binary()),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail("provider", &format_missing(&missing)));
    }
}

fn check_config(config: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if !config.exists() {
        checks.push(Check::warn(
            "config",
            &format!("Option file {} not found", config.display()),
        ));
        return;
    }
    match validate::resolve(config) {
        Ok(resolved) => checks.push(Check::pass(
            "config",
            &format!(
                "{} is valid ({} options resolved)",
                config.display(),
                resolved.len()
            ),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("config", &e));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Berth Doctor\n");
        for check in checks {
            println!("  {} {}", status_icon(check.status), check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
