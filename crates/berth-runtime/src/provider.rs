use crate::types::ContainerId;
use crate::RuntimeError;
use berth_schema::{ContainerConfig, VolumeBinding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// Lazily produced, order-preserving container log lines (raw bytes, no newline).
pub type LogStream = Box<dyn Iterator<Item = io::Result<Vec<u8>>> + Send>;

/// Everything a provider needs to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub name: Option<String>,
    /// Container port -> host port.
    pub ports: BTreeMap<u16, u16>,
    /// Host path -> binding.
    pub volumes: BTreeMap<String, VolumeBinding>,
    pub environment: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: Vec::new(),
            name: None,
            ports: BTreeMap::new(),
            volumes: BTreeMap::new(),
            environment: BTreeMap::new(),
        }
    }
}

impl From<&ContainerConfig> for ContainerSpec {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            image: config.image.clone(),
            command: config
                .command
                .as_deref()
                .map(split_command)
                .unwrap_or_default(),
            name: config.name.clone(),
            ports: config.ports.clone(),
            volumes: config.volumes.clone(),
            environment: config.environment.clone(),
        }
    }
}

/// Split a command string into words, honoring single and double quotes.
pub fn split_command(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    /// States in which a container still has to be stopped on release.
    pub fn is_live(self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Created)
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" | "stopped" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A live container owned by exactly one lifecycle run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: ContainerId,
    pub image: String,
    pub status: ContainerStatus,
}

impl ContainerHandle {
    pub fn new(id: impl Into<ContainerId>, image: impl Into<String>, status: ContainerStatus) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            status,
        }
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.id.short(), self.image, self.status)
    }
}

/// The only surface of a container engine the lifecycle depends on.
///
/// `stop` and `kill` are no-ops against a container that is no longer live.
pub trait ContainerProvider: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Follow the container's output from the beginning.
    fn logs(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError>;

    /// Address reachable from the host, if the provider reports one.
    fn network_address(&self, handle: &ContainerHandle) -> Result<Option<IpAddr>, RuntimeError>;

    fn stop(&self, handle: &ContainerHandle, grace: Duration) -> Result<(), RuntimeError>;

    fn kill(&self, handle: &ContainerHandle, signal: i32) -> Result<(), RuntimeError>;

    fn status(&self, handle: &ContainerHandle) -> Result<ContainerStatus, RuntimeError>;

    fn remove(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        Err(RuntimeError::ExecFailed(format!(
            "remove not supported by {} provider",
            self.name()
        )))
    }
}

pub fn select_provider(name: &str) -> Result<Box<dyn ContainerProvider>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerProvider::new())),
        "mock" => Ok(Box::new(crate::mock::MockProvider::new())),
        other => Err(RuntimeError::ProviderUnavailable(other.to_owned())),
    }
}
