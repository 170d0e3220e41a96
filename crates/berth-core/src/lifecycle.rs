use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Phases of one wrapped invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Starting,
    AwaitingReady,
    Executing,
    ShuttingDown,
    Done,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::AwaitingReady => "awaiting_ready",
            LifecycleState::Executing => "executing",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Done => "done",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: LifecycleState, to: LifecycleState) -> Result<(), CoreError> {
    use LifecycleState::{AwaitingReady, Done, Executing, Idle, ShuttingDown, Starting};

    let valid = matches!(
        (from, to),
        (Idle, Starting)
            | (Starting, AwaitingReady)
            | (AwaitingReady, Executing)
            | (Starting | AwaitingReady | Executing, ShuttingDown)
            | (ShuttingDown, Done)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Current phase of one invocation, with every visited phase recorded.
#[derive(Debug, Clone)]
pub struct LifecycleTracker {
    wrapper: String,
    history: Vec<LifecycleState>,
}

impl LifecycleTracker {
    pub fn new(wrapper: impl Into<String>) -> Self {
        Self {
            wrapper: wrapper.into(),
            history: vec![LifecycleState::Idle],
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.history
            .last()
            .copied()
            .unwrap_or(LifecycleState::Idle)
    }

    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn advance(&mut self, to: LifecycleState) -> Result<(), CoreError> {
        let from = self.state();
        validate_transition(from, to)?;
        debug!("[{}] lifecycle {from} -> {to}", self.wrapper);
        self.history.push(to);
        Ok(())
    }
}
