use crate::provider::{ContainerHandle, ContainerProvider, ContainerSpec, ContainerStatus, LogStream};
use crate::RuntimeError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read};
use std::net::IpAddr;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;
use tracing::{debug, warn};

/// Provider backed by the `docker` command-line client.
pub struct DockerProvider {
    binary: String,
}

impl Default for DockerProvider {
    fn default() -> Self {
        Self {
            binary: std::env::var("BERTH_DOCKER").unwrap_or_else(|_| "docker".to_owned()),
        }
    }
}

impl DockerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn run(&self, args: &[String]) -> Result<String, RuntimeError> {
        debug!("[docker] {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary).args(args).output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.first().map_or("", String::as_str)),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    fn inspect(&self, handle: &ContainerHandle) -> Result<Inspect, RuntimeError> {
        let out = self
            .run(&["inspect".to_owned(), handle.id.to_string()])
            .map_err(|e| match e {
                RuntimeError::CommandFailed { stderr, .. } if stderr.contains("No such") => {
                    RuntimeError::ContainerNotFound(handle.id.to_string())
                }
                other => other,
            })?;
        parse_inspect(&out)
    }
}

/// Arguments for `docker run` in detached mode.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_owned(), "--detach".to_owned()];
    if let Some(name) = &spec.name {
        args.push("--name".to_owned());
        args.push(name.clone());
    }
    for (container_port, host_port) in &spec.ports {
        args.push("--publish".to_owned());
        args.push(format!("{host_port}:{container_port}"));
    }
    for (host, binding) in &spec.volumes {
        args.push("--volume".to_owned());
        args.push(format!("{host}:{}:{}", binding.bind, binding.mode));
    }
    for (k, v) in &spec.environment {
        args.push("--env".to_owned());
        args.push(format!("{k}={v}"));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Inspect {
    state: InspectState,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(default)]
    networks: BTreeMap<String, Network>,
}

#[derive(Debug, Deserialize)]
struct Network {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

impl Inspect {
    fn status(&self) -> ContainerStatus {
        ContainerStatus::parse(&self.state.status)
    }

    /// Default-bridge address first, then the first user-defined network with one.
    fn address(&self) -> Result<Option<IpAddr>, RuntimeError> {
        let settings = &self.network_settings;
        let raw = std::iter::once(&settings.ip_address)
            .chain(settings.networks.values().map(|n| &n.ip_address))
            .find(|ip| !ip.is_empty());
        raw.map(|ip| {
            ip.parse()
                .map_err(|_| RuntimeError::InvalidOutput(format!("invalid IP address '{ip}'")))
        })
        .transpose()
    }
}

fn parse_inspect(output: &str) -> Result<Inspect, RuntimeError> {
    let mut entries: Vec<Inspect> = serde_json::from_str(output)
        .map_err(|e| RuntimeError::InvalidOutput(format!("docker inspect: {e}")))?;
    if entries.is_empty() {
        return Err(RuntimeError::InvalidOutput(
            "docker inspect returned no entries".to_owned(),
        ));
    }
    Ok(entries.swap_remove(0))
}

/// Output of `docker logs --follow`, stdout and stderr interleaved by arrival.
struct DockerLogs {
    child: Child,
    lines: Receiver<io::Result<Vec<u8>>>,
}

fn forward_lines(source: impl Read + Send + 'static, tx: Sender<io::Result<Vec<u8>>>) {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(source);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                        line.pop();
                    }
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });
}

impl Iterator for DockerLogs {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.recv().ok()
    }
}

impl Drop for DockerLogs {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl ContainerProvider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        Command::new(&self.binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let id = self.run(&run_args(spec))?;
        let id = id.lines().last().unwrap_or_default().trim().to_owned();
        if id.is_empty() {
            return Err(RuntimeError::InvalidOutput(
                "docker run printed no container id".to_owned(),
            ));
        }
        let mut handle = ContainerHandle::new(id, spec.image.clone(), ContainerStatus::Created);
        // The container exists from here on; the caller must get its handle back.
        match self.status(&handle) {
            Ok(status) => handle.status = status,
            Err(e) => warn!(
                "[docker] started {} but could not inspect it: {e}",
                handle.id.short()
            ),
        }
        Ok(handle)
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError> {
        let mut child = Command::new(&self.binary)
            .args(["logs", "--follow", handle.id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }
        Ok(Box::new(DockerLogs { child, lines: rx }))
    }

    fn network_address(&self, handle: &ContainerHandle) -> Result<Option<IpAddr>, RuntimeError> {
        self.inspect(handle)?.address()
    }

    fn stop(&self, handle: &ContainerHandle, grace: Duration) -> Result<(), RuntimeError> {
        self.run(&[
            "stop".to_owned(),
            "--time".to_owned(),
            grace.as_secs().to_string(),
            handle.id.to_string(),
        ])?;
        Ok(())
    }

    fn kill(&self, handle: &ContainerHandle, signal: i32) -> Result<(), RuntimeError> {
        if !self.status(handle)?.is_live() {
            return Ok(());
        }
        self.run(&[
            "kill".to_owned(),
            "--signal".to_owned(),
            signal.to_string(),
            handle.id.to_string(),
        ])?;
        Ok(())
    }

    fn status(&self, handle: &ContainerHandle) -> Result<ContainerStatus, RuntimeError> {
        Ok(self.inspect(handle)?.status())
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.run(&["rm".to_owned(), "--volumes".to_owned(), handle.id.to_string()])?;
        Ok(())
    }
}
