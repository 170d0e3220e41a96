//! Lifecycle orchestration for Berth.
//!
//! A [`Wrapping`] describes how to acquire, ready and release one resource.
//! [`decorated`] binds a wrapping to an operation: every call starts a fresh
//! resource, waits for it, runs the operation and releases the resource on
//! every exit path. [`ContainerWrapping`] is the Docker-backed wrapping built
//! from validated options.

pub mod concurrency;
pub mod container;
pub mod decorated;
pub mod lifecycle;
pub mod wrapping;

pub use concurrency::{install_signal_handler, shutdown_requested, ShutdownFlag};
pub use container::ContainerWrapping;
pub use decorated::{decorated, run_wrapped, Decorated, InvocationError};
pub use lifecycle::{validate_transition, LifecycleState, LifecycleTracker};
pub use wrapping::{Arg, Call, Wrapping};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Schema(#[from] berth_schema::SchemaError),
    #[error("runtime error: {0}")]
    Runtime(#[from] berth_runtime::RuntimeError),
    #[error("[{wrapper}] failed to start container from '{image}': {source}")]
    Acquisition {
        wrapper: String,
        image: String,
        #[source]
        source: berth_runtime::RuntimeError,
    },
    #[error("[{wrapper}] container {container} did not become ready: {source}")]
    Readiness {
        wrapper: String,
        container: String,
        #[source]
        source: berth_runtime::RuntimeError,
    },
    #[error("[{wrapper}] failed to release container {container}: {source}")]
    Release {
        wrapper: String,
        container: String,
        #[source]
        source: berth_runtime::RuntimeError,
    },
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
