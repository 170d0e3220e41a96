use crate::concurrency::shutdown_requested;
use crate::wrapping::Wrapping;
use crate::CoreError;
use berth_runtime::{
    wait_for_log, wait_for_port, Connector, ContainerHandle, ContainerProvider, ContainerSpec,
    LogWait, PortPoll, ReadinessError, RuntimeError, TcpConnector, DEFAULT_POLL_INTERVAL,
};
use berth_schema::{container_schema, validate, ContainerConfig, RawOptions, ResolvedConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Docker-backed wrapping built from validated options.
pub struct ContainerWrapping {
    name: String,
    resolved: ResolvedConfig,
    config: ContainerConfig,
    spec: ContainerSpec,
    provider: Arc<dyn ContainerProvider>,
    connector: Arc<dyn Connector + Send + Sync>,
    poll_interval: Duration,
    cancelled: fn() -> bool,
    create_lock: Mutex<()>,
}

impl ContainerWrapping {
    /// Validate `raw` and bind the result to `provider`.
    ///
    /// Fails before any container is touched if the options are invalid.
    pub fn new(raw: &RawOptions, provider: Arc<dyn ContainerProvider>) -> Result<Self, CoreError> {
        let schema = container_schema()?;
        let resolved = validate(&schema, raw)?;
        let config = ContainerConfig::from_resolved(&resolved)?;
        let spec = ContainerSpec::from(&config);
        Ok(Self {
            name: schema.name().to_owned(),
            resolved,
            config,
            spec,
            provider,
            connector: Arc::new(TcpConnector::default()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancelled: shutdown_requested,
            create_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector + Send + Sync>) -> Self {
        self.connector = connector;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancelled: fn() -> bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub fn provider(&self) -> &dyn ContainerProvider {
        self.provider.as_ref()
    }

    fn not_ready(&self, handle: &ContainerHandle, source: RuntimeError) -> CoreError {
        CoreError::Readiness {
            wrapper: self.name.clone(),
            container: handle.id.short().to_owned(),
            source,
        }
    }

    fn release_failed(&self, handle: &ContainerHandle, source: RuntimeError) -> CoreError {
        CoreError::Release {
            wrapper: self.name.clone(),
            container: handle.id.short().to_owned(),
            source,
        }
    }

    fn await_log(&self, handle: &ContainerHandle, needle: &str) -> Result<(), RuntimeError> {
        debug!("[{}] waiting for log line '{needle}'", self.name);
        let stream = self.provider.logs(handle)?;
        match wait_for_log(stream, needle, self.config.readiness.timeout, self.cancelled)? {
            LogWait::Matched { .. } => Ok(()),
            LogWait::Exhausted { lines_read } if self.config.readiness.strict_log => {
                debug!("[{}] log ended after {lines_read} line(s)", self.name);
                Err(ReadinessError::LogExhausted(needle.to_owned()).into())
            }
            LogWait::Exhausted { lines_read } => {
                warn!(
                    "[{}] log of {} ended after {lines_read} line(s) without '{needle}', continuing",
                    self.name,
                    handle.id.short()
                );
                Ok(())
            }
        }
    }

    fn await_port(&self, handle: &ContainerHandle, port: u16) -> Result<(), RuntimeError> {
        let addr = self.port_address(handle, port)?;
        debug!("[{}] waiting for port {addr}", self.name);
        let poll = PortPoll {
            interval: self.poll_interval,
            timeout: self.config.readiness.timeout,
            cancelled: self.cancelled,
        };
        wait_for_port(self.connector.as_ref(), addr, &poll)?;
        Ok(())
    }

    /// Container address when the provider reports one, otherwise the
    /// published host port on loopback.
    fn port_address(&self, handle: &ContainerHandle, port: u16) -> Result<SocketAddr, RuntimeError> {
        if let Some(ip) = self.provider.network_address(handle)? {
            return Ok(SocketAddr::new(ip, port));
        }
        let host_port = self.config.ports.get(&port).copied().unwrap_or(port);
        debug!(
            "[{}] no container address for {}, probing 127.0.0.1:{host_port}",
            self.name,
            handle.id.short()
        );
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), host_port))
    }
}

impl Wrapping for ContainerWrapping {
    type Handle = ContainerHandle;

    fn name(&self) -> &str {
        &self.name
    }

    fn inject_arg(&self) -> bool {
        self.config.inject_arg
    }

    fn start(&self) -> Result<ContainerHandle, CoreError> {
        // Creation is serialized; everything after it runs concurrently.
        let _guard = self
            .create_lock
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("create lock poisoned: {e}")))?;
        let handle = self
            .provider
            .create(&self.spec)
            .map_err(|source| CoreError::Acquisition {
                wrapper: self.name.clone(),
                image: self.config.image.clone(),
                source,
            })?;
        debug!(
            "[{}] started container {} from '{}'",
            self.name,
            handle.id.short(),
            self.config.image
        );
        Ok(handle)
    }

    fn await_ready(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        let readiness = &self.config.readiness;
        if let Some(needle) = &readiness.log {
            self.await_log(handle, needle)
                .map_err(|e| self.not_ready(handle, e))?;
        }
        if let Some(port) = readiness.port {
            self.await_port(handle, port)
                .map_err(|e| self.not_ready(handle, e))?;
        }
        Ok(())
    }

    fn shutdown(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        let status = self
            .provider
            .status(handle)
            .map_err(|e| self.release_failed(handle, e))?;

        if status.is_live() {
            if let Some(signal) = self.config.kill_signal {
                debug!("[{}] killing {} with signal {signal}", self.name, handle.id.short());
                self.provider
                    .kill(handle, signal)
                    .map_err(|e| self.release_failed(handle, e))?;
            } else {
                debug!(
                    "[{}] stopping {} (grace {:?})",
                    self.name,
                    handle.id.short(),
                    self.config.stop_timeout
                );
                self.provider
                    .stop(handle, self.config.stop_timeout)
                    .map_err(|e| self.release_failed(handle, e))?;
            }
        } else {
            debug!(
                "[{}] container {} is {status}, nothing to stop",
                self.name,
                handle.id.short()
            );
        }

        if self.config.remove {
            self.provider
                .remove(handle)
                .map_err(|e| self.release_failed(handle, e))?;
            debug!("[{}] removed {}", self.name, handle.id.short());
        }
        Ok(())
    }
}
