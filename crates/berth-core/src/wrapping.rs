use crate::CoreError;
use berth_schema::Value;
use std::collections::BTreeMap;

/// How to acquire, ready and release one resource per invocation.
///
/// Implementations hold configuration only. Every handle comes from a fresh
/// `start` and is owned by exactly one invocation.
pub trait Wrapping: Send + Sync {
    type Handle: Clone + Send;

    /// Prefix used in log lines and error messages.
    fn name(&self) -> &str;

    /// Whether the handle is passed to the operation ahead of its arguments.
    fn inject_arg(&self) -> bool;

    fn start(&self) -> Result<Self::Handle, CoreError>;

    /// Block until the resource is usable. Ready immediately by default.
    fn await_ready(&self, _handle: &Self::Handle) -> Result<(), CoreError> {
        Ok(())
    }

    /// Values injected ahead of the caller's positional arguments.
    fn args(&self, handle: &Self::Handle) -> Vec<Self::Handle> {
        vec![handle.clone()]
    }

    fn shutdown(&self, handle: &Self::Handle) -> Result<(), CoreError>;
}

/// One positional argument handed to the wrapped operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<H> {
    Resource(H),
    Value(Value),
}

impl<H> Arg<H> {
    pub fn resource(&self) -> Option<&H> {
        match self {
            Arg::Resource(h) => Some(h),
            Arg::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            Arg::Resource(_) => None,
        }
    }
}

impl<H> From<Value> for Arg<H> {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

/// Arguments of a single invocation after injection.
#[derive(Debug, Clone, PartialEq)]
pub struct Call<H> {
    pub args: Vec<Arg<H>>,
    pub kwargs: BTreeMap<String, Value>,
}

impl<H> Call<H> {
    /// The injected handle, if any.
    pub fn resource(&self) -> Option<&H> {
        self.args.first().and_then(Arg::resource)
    }

    /// Caller-supplied positional values, without injected handles.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.args.iter().filter_map(Arg::value)
    }
}
