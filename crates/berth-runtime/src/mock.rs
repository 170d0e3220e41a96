use crate::provider::{ContainerHandle, ContainerProvider, ContainerSpec, ContainerStatus, LogStream};
use crate::RuntimeError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

/// Number of calls a [`MockProvider`] has served, per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub created: usize,
    pub stopped: usize,
    pub killed: Vec<i32>,
    pub removed: usize,
    pub last_grace: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    containers: HashMap<String, ContainerStatus>,
    specs: Vec<ContainerSpec>,
    calls: MockCalls,
}

/// In-memory provider with scripted logs, address and failures.
pub struct MockProvider {
    state: Mutex<MockState>,
    logs: Vec<String>,
    address: Option<IpAddr>,
    initial_status: ContainerStatus,
    fail_create: bool,
    fail_logs: bool,
    fail_release: bool,
    silent_logs: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            logs: Vec::new(),
            address: None,
            initial_status: ContainerStatus::Running,
            fail_create: false,
            fail_logs: false,
            fail_release: false,
            silent_logs: false,
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_logs<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.logs = lines.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    #[must_use]
    pub fn with_initial_status(mut self, status: ContainerStatus) -> Self {
        self.initial_status = status;
        self
    }

    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    #[must_use]
    pub fn failing_logs(mut self) -> Self {
        self.fail_logs = true;
        self
    }

    /// Log stream that never yields a line and never ends.
    #[must_use]
    pub fn with_silent_logs(mut self) -> Self {
        self.silent_logs = true;
        self
    }

    /// Make `stop`, `kill` and `remove` fail.
    #[must_use]
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn calls(&self) -> MockCalls {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Specs passed to `create`, in call order.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.lock().map(|s| s.specs.clone()).unwrap_or_default()
    }

    /// Simulate the container changing state behind the provider's back.
    pub fn set_status(&self, handle: &ContainerHandle, status: ContainerStatus) {
        if let Ok(mut state) = self.lock() {
            state.containers.insert(handle.id.to_string(), status);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    fn known(state: &MockState, handle: &ContainerHandle) -> Result<ContainerStatus, RuntimeError> {
        state
            .containers
            .get(handle.id.as_str())
            .copied()
            .ok_or_else(|| RuntimeError::ContainerNotFound(handle.id.to_string()))
    }
}

impl ContainerProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        if self.fail_create {
            return Err(RuntimeError::ImageNotFound(spec.image.clone()));
        }
        let mut state = self.lock()?;
        state.calls.created += 1;
        state.specs.push(spec.clone());
        // Deterministic 64-hex id, unique per create call.
        let id = blake3::hash(format!("mock-container:{}:{}", spec.image, state.calls.created).as_bytes())
            .to_hex()
            .to_string();
        state.containers.insert(id.clone(), self.initial_status);
        Ok(ContainerHandle::new(id, spec.image.clone(), self.initial_status))
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError> {
        Self::known(&*self.lock()?, handle)?;
        if self.fail_logs {
            return Err(RuntimeError::ExecFailed("mock log stream unavailable".to_owned()));
        }
        if self.silent_logs {
            return Ok(Box::new(std::iter::from_fn(
                || -> Option<std::io::Result<Vec<u8>>> {
                    loop {
                        std::thread::sleep(Duration::from_secs(60));
                    }
                },
            )));
        }
        let lines: Vec<_> = self.logs.iter().map(|l| Ok(l.clone().into_bytes())).collect();
        Ok(Box::new(lines.into_iter()))
    }

    fn network_address(&self, handle: &ContainerHandle) -> Result<Option<IpAddr>, RuntimeError> {
        Self::known(&*self.lock()?, handle)?;
        Ok(self.address)
    }

    fn stop(&self, handle: &ContainerHandle, grace: Duration) -> Result<(), RuntimeError> {
        let mut state = self.lock()?;
        let status = Self::known(&state, handle)?;
        state.calls.stopped += 1;
        state.calls.last_grace = Some(grace);
        if self.fail_release {
            return Err(RuntimeError::ExecFailed("mock stop failure".to_owned()));
        }
        if status.is_live() {
            state.containers.insert(handle.id.to_string(), ContainerStatus::Exited);
        }
        Ok(())
    }

    fn kill(&self, handle: &ContainerHandle, signal: i32) -> Result<(), RuntimeError> {
        let mut state = self.lock()?;
        let status = Self::known(&state, handle)?;
        state.calls.killed.push(signal);
        if self.fail_release {
            return Err(RuntimeError::ExecFailed("mock kill failure".to_owned()));
        }
        if status.is_live() {
            state.containers.insert(handle.id.to_string(), ContainerStatus::Exited);
        }
        Ok(())
    }

    fn status(&self, handle: &ContainerHandle) -> Result<ContainerStatus, RuntimeError> {
        Self::known(&*self.lock()?, handle)
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let mut state = self.lock()?;
        let status = Self::known(&state, handle)?;
        if status.is_live() {
            return Err(RuntimeError::ExecFailed(format!(
                "cannot remove running container {}",
                handle.id.short()
            )));
        }
        state.calls.removed += 1;
        state.containers.remove(handle.id.as_str());
        Ok(())
    }
}
