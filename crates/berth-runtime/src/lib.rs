//! Container providers and readiness probing for Berth.
//!
//! This crate implements the resource side of a lifecycle run: the
//! `ContainerProvider` trait with a Docker CLI backend and a scripted mock
//! backend, the `ContainerHandle` returned on every create, the two
//! readiness strategies (log matching and TCP port polling), and
//! prerequisite checks for the Docker backend.

pub mod docker;
pub mod mock;
pub mod prereq;
pub mod provider;
pub mod readiness;
pub mod types;

pub use docker::DockerProvider;
pub use mock::{MockCalls, MockProvider};
pub use prereq::{check_docker_prereqs, format_missing, MissingPrereq};
pub use provider::{
    select_provider, ContainerHandle, ContainerProvider, ContainerSpec, ContainerStatus, LogStream,
};
pub use readiness::{
    wait_for_log, wait_for_port, Connector, LogWait, PortPoll, PortWait, ReadinessError,
    TcpConnector, DEFAULT_POLL_INTERVAL,
};
pub use types::ContainerId;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("provider '{0}' is not available on this system")]
    ProviderUnavailable(String),
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("unexpected provider output: {0}")]
    InvalidOutput(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("readiness check failed: {0}")]
    Readiness(#[from] ReadinessError),
}
