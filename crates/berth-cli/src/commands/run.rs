use super::{load_options, open_provider, spin_fail, spin_ok, spinner, EXIT_FAILURE};
use berth_core::{run_wrapped, Arg, Call, ContainerWrapping, CoreError, InvocationError, Wrapping};
use berth_runtime::ContainerHandle;
use berth_schema::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Exported to the child so it can find its container without `inject_arg`.
pub const CONTAINER_ID_ENV: &str = "BERTH_CONTAINER_ID";

/// Always hands the handle to the child command; whether it also becomes
/// the first argument follows the container's `inject_arg` option.
struct ExportHandle(ContainerWrapping);

impl Wrapping for ExportHandle {
    type Handle = ContainerHandle;

    fn name(&self) -> &str {
        self.0.name()
    }

    fn inject_arg(&self) -> bool {
        true
    }

    fn start(&self) -> Result<ContainerHandle, CoreError> {
        self.0.start()
    }

    fn await_ready(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        self.0.await_ready(handle)
    }

    fn shutdown(&self, handle: &ContainerHandle) -> Result<(), CoreError> {
        self.0.shutdown(handle)
    }
}

pub fn run(config: &Path, provider: &str, command: &[String]) -> Result<u8, String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| "no command given".to_owned())?;

    let raw = load_options(config)?;
    let provider = open_provider(provider)?;
    let wrapping = ContainerWrapping::new(&raw, provider).map_err(|e| e.to_string())?;
    let inject = wrapping.inject_arg();
    let image = wrapping.config().image.clone();
    let wrapping = ExportHandle(wrapping);

    let pb = spinner(&format!("starting {image}..."));
    let values = args.iter().map(|a| Value::from(a.as_str())).collect();

    let outcome = run_wrapped(
        &wrapping,
        program,
        values,
        BTreeMap::new(),
        |call: Call<ContainerHandle>| -> Result<ExitStatus, io::Error> {
            spin_ok(&pb, &format!("{image} ready"));
            spawn_child(program, inject, &call)
        },
    );

    match outcome {
        Ok(status) => Ok(exit_code(status)),
        Err(e) => {
            if !pb.is_finished() {
                spin_fail(&pb, &format!("{image} failed to start"));
            }
            Err(describe(program, &e))
        }
    }
}

fn spawn_child(program: &str, inject: bool, call: &Call<ContainerHandle>) -> io::Result<ExitStatus> {
    let mut cmd = Command::new(program);
    for arg in &call.args {
        match arg {
            Arg::Resource(handle) => {
                cmd.env(CONTAINER_ID_ENV, handle.id.as_str());
                if inject {
                    cmd.arg(handle.id.as_str());
                }
            }
            Arg::Value(Value::Str(s)) => {
                cmd.arg(s);
            }
            Arg::Value(other) => {
                cmd.arg(other.to_string());
            }
        }
    }
    cmd.status()
}

fn exit_code(status: ExitStatus) -> u8 {
    status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(EXIT_FAILURE)
}

fn describe(program: &str, e: &InvocationError<io::Error>) -> String {
    match e {
        InvocationError::Operation { source, release } => {
            let mut msg = format!("failed to run '{program}': {source}");
            if let Some(r) = release {
                msg.push_str(&format!(" (release also failed: {r})"));
            }
            msg
        }
        other => other.to_string(),
    }
}
