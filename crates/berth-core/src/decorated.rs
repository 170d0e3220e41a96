use crate::lifecycle::{LifecycleState, LifecycleTracker};
use crate::wrapping::{Arg, Call, Wrapping};
use crate::CoreError;
use berth_schema::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error, warn};

/// Why a wrapped invocation failed.
///
/// The operation's own error always wins over a release error; the latter is
/// kept alongside it in `release`.
#[derive(Debug)]
pub enum InvocationError<E> {
    /// No resource was acquired.
    Start(CoreError),
    /// The resource was acquired but never became ready; the operation did not run.
    Readiness {
        source: CoreError,
        release: Option<CoreError>,
    },
    Operation {
        source: E,
        release: Option<CoreError>,
    },
    /// The operation succeeded but releasing the resource failed.
    Release(CoreError),
}

impl<E> InvocationError<E> {
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            InvocationError::Operation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Recover the operation's error unchanged.
    pub fn into_operation_error(self) -> Result<E, Self> {
        match self {
            InvocationError::Operation { source, .. } => Ok(source),
            other => Err(other),
        }
    }

    pub fn release_error(&self) -> Option<&CoreError> {
        match self {
            InvocationError::Readiness { release, .. } | InvocationError::Operation { release, .. } => {
                release.as_ref()
            }
            InvocationError::Release(e) => Some(e),
            InvocationError::Start(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for InvocationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::Start(e) | InvocationError::Release(e) => write!(f, "{e}"),
            InvocationError::Readiness { source, release } => {
                write!(f, "{source}")?;
                if let Some(r) = release {
                    write!(f, " (release also failed: {r})")?;
                }
                Ok(())
            }
            InvocationError::Operation { source, release } => {
                write!(f, "operation failed: {source}")?;
                if let Some(r) = release {
                    write!(f, " (release also failed: {r})")?;
                }
                Ok(())
            }
        }
    }
}

impl<E> std::error::Error for InvocationError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvocationError::Start(e) | InvocationError::Release(e) => Some(e),
            InvocationError::Readiness { source, .. } => Some(source),
            InvocationError::Operation { source, .. } => Some(source),
        }
    }
}

/// Releases the handle exactly once: explicitly via `release`, or on drop
/// when unwinding out of the operation.
struct ReleaseGuard<'a, W: Wrapping> {
    wrapping: &'a W,
    handle: W::Handle,
    released: bool,
}

impl<'a, W: Wrapping> ReleaseGuard<'a, W> {
    fn new(wrapping: &'a W, handle: W::Handle) -> Self {
        Self {
            wrapping,
            handle,
            released: false,
        }
    }

    fn handle(&self) -> &W::Handle {
        &self.handle
    }

    fn release(mut self) -> Result<(), CoreError> {
        self.released = true;
        self.wrapping.shutdown(&self.handle)
    }
}

impl<W: Wrapping> Drop for ReleaseGuard<'_, W> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.wrapping.shutdown(&self.handle) {
            error!("[{}] release during unwind failed: {e}", self.wrapping.name());
        }
    }
}

enum Failure<E> {
    Setup(CoreError),
    Operation(E),
}

/// Run `op` once inside a fresh resource from `wrapping`.
///
/// Sequence: start, await readiness, call `op` with the handle prepended
/// when injection is on, release. Release runs on every path once the
/// resource exists, including a panic inside `op`.
pub fn run_wrapped<W, T, E, F>(
    wrapping: &W,
    operation: &str,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    op: F,
) -> Result<T, InvocationError<E>>
where
    W: Wrapping,
    E: fmt::Display,
    F: FnOnce(Call<W::Handle>) -> Result<T, E>,
{
    let name = wrapping.name().to_owned();
    let mut tracker = LifecycleTracker::new(&name);

    debug!("[{name}] starting before '{operation}'");
    tracker.advance(LifecycleState::Starting).map_err(InvocationError::Start)?;
    let handle = match wrapping.start() {
        Ok(handle) => handle,
        Err(e) => {
            error!("[{name}] could not start resource for '{operation}': {e}");
            // Nothing to release.
            let _ = tracker.advance(LifecycleState::ShuttingDown);
            let _ = tracker.advance(LifecycleState::Done);
            return Err(InvocationError::Start(e));
        }
    };
    let guard = ReleaseGuard::new(wrapping, handle);

    let outcome = (|| -> Result<T, Failure<E>> {
        tracker
            .advance(LifecycleState::AwaitingReady)
            .map_err(Failure::Setup)?;
        wrapping.await_ready(guard.handle()).map_err(Failure::Setup)?;
        tracker
            .advance(LifecycleState::Executing)
            .map_err(Failure::Setup)?;

        let mut positional: Vec<Arg<W::Handle>> = Vec::with_capacity(args.len() + 1);
        if wrapping.inject_arg() {
            positional.extend(wrapping.args(guard.handle()).into_iter().map(Arg::Resource));
        }
        positional.extend(args.into_iter().map(Arg::Value));

        debug!("[{name}] executing '{operation}'");
        op(Call {
            args: positional,
            kwargs,
        })
        .map_err(Failure::Operation)
    })();

    if let Err(e) = tracker.advance(LifecycleState::ShuttingDown) {
        warn!("[{name}] {e}");
    }
    debug!("[{name}] shutting down after '{operation}'");
    let released = guard.release();
    if let Err(e) = tracker.advance(LifecycleState::Done) {
        warn!("[{name}] {e}");
    }

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => {
            error!("{e}");
            Err(InvocationError::Release(e))
        }
        (Err(Failure::Setup(source)), released) => {
            error!("[{name}] '{operation}' did not run: {source}");
            let release = released.err();
            if let Some(r) = &release {
                error!("{r}");
            }
            Err(InvocationError::Readiness { source, release })
        }
        (Err(Failure::Operation(source)), released) => {
            error!("[{name}] error in '{operation}': {source}");
            let release = released.err();
            if let Some(r) = &release {
                error!("{r}");
            }
            Err(InvocationError::Operation { source, release })
        }
    }
}

/// An operation bound to a wrapping. Each `call` is an independent
/// invocation with its own resource.
pub struct Decorated<W, F> {
    wrapping: W,
    operation: String,
    func: F,
}

/// Bind `func` to `wrapping`.
pub fn decorated<W, F>(wrapping: W, func: F) -> Decorated<W, F>
where
    W: Wrapping,
{
    Decorated {
        wrapping,
        operation: "operation".to_owned(),
        func,
    }
}

impl<W: Wrapping, F> Decorated<W, F> {
    /// Name of the operation in log lines.
    #[must_use]
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn wrapping(&self) -> &W {
        &self.wrapping
    }

    pub fn call<T, E>(
        &self,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<T, InvocationError<E>>
    where
        F: Fn(Call<W::Handle>) -> Result<T, E>,
        E: fmt::Display,
    {
        run_wrapped(&self.wrapping, &self.operation, args, kwargs, &self.func)
    }
}
